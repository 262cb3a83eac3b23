use criterion::{criterion_group, criterion_main, Criterion};
use edgefirst_isp::{
    cmdbuf::{decode_commands, BufferKind, CommitLog},
    iq::ModuleKind,
    pool::{DeviceAffinity, ResourcePool},
    settings::{self, IqSettingsBlock, ModuleSettings},
};

const REGISTERS: [u32; 16] = [0x5a5a; 16];

fn encode_registers(pool: &mut ResourcePool, id: u64) {
    let handle = pool.acquire(id).unwrap();
    {
        let mut stream = pool.begin_write(handle, ModuleKind::COUNT * (REGISTERS.len() + 2)).unwrap();
        for kind in ModuleKind::ALL {
            stream
                .write_reg_range(0x400 + 0x40 * kind.index() as u32, &REGISTERS)
                .unwrap();
        }
    }
    pool.commit(handle, &mut CommitLog::new()).unwrap();
    pool.recycle(handle).unwrap();
}

fn encode_tables(pool: &mut ResourcePool, table: &[u32], id: u64) {
    let handle = pool.acquire(id).unwrap();
    {
        let mut stream = pool.begin_write(handle, 8 * (table.len() + 2)).unwrap();
        for select in 0..8u8 {
            stream.write_dmi(select, select & 1, table).unwrap();
        }
    }
    pool.commit(handle, &mut CommitLog::new()).unwrap();
    pool.recycle(handle).unwrap();
}

fn encode_settings(pool: &mut ResourcePool, block: &IqSettingsBlock, id: u64) {
    let handle = pool.acquire(id).unwrap();
    {
        let mut stream = pool.begin_write(handle, settings::schema().total_words()).unwrap();
        block.encode(&mut stream).unwrap();
    }
    pool.commit(handle, &mut CommitLog::new()).unwrap();
    pool.recycle(handle).unwrap();
}

pub fn benchmark_commands(c: &mut Criterion) {
    let mut group = c.benchmark_group("commands");
    let mut id = 0;

    let words = ModuleKind::COUNT * (REGISTERS.len() + 2);
    let mut registers = ResourcePool::new("registers", BufferKind::Generic, words * 4, 1, DeviceAffinity::Host).unwrap();
    group.bench_function("registers", |b| {
        b.iter(|| {
            id += 1;
            encode_registers(&mut registers, id)
        })
    });

    for entries in [64usize, 256, 1024] {
        let table: Vec<u32> = (0..entries as u32).collect();
        let mut dmi = ResourcePool::new("dmi", BufferKind::Dmi, 8 * (entries + 2) * 4, 1, DeviceAffinity::Host).unwrap();
        group.bench_with_input(format!("dmi/{}", entries), &table, |b, table| {
            b.iter(|| {
                id += 1;
                encode_tables(&mut dmi, table, id)
            })
        });
    }

    let mut block = IqSettingsBlock::new(1);
    for kind in ModuleKind::ALL {
        block.set(
            kind,
            ModuleSettings {
                enable: true,
                params: [kind.index() as u32; settings::FW_PARAM_WORDS],
            },
        );
    }
    let mut pool = ResourcePool::new(
        "iq-settings",
        BufferKind::IqSettings,
        settings::schema().total_bytes(),
        1,
        DeviceAffinity::Host,
    )
    .unwrap();
    group.bench_function("iq-settings", |b| {
        b.iter(|| {
            id += 1;
            encode_settings(&mut pool, &block, id)
        })
    });

    let stream: Vec<u32> = ModuleKind::ALL
        .iter()
        .flat_map(|_| {
            let mut words = vec![edgefirst_isp::cmdbuf::reg_range_header(REGISTERS.len()), 0x400];
            words.extend_from_slice(&REGISTERS);
            words
        })
        .collect();
    group.bench_with_input("decode", &stream, |b, stream| b.iter(|| decode_commands(stream)));
}

criterion_group!(benches, benchmark_commands);
criterion_main!(benches);
