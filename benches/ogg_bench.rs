use criterion::{black_box, criterion_group, criterion_main, Criterion};
use oggcomment::crc::checksum;
use oggcomment::packet::PacketWriter;
use oggcomment::page::Page;
use oggcomment::{rewrite_bytes, read_fields, CodecId, CommentBlock, CommentPacket, FieldStore, RewriteOptions};

fn vorbis_ident() -> Vec<u8> {
    let mut p = b"\x01vorbis".to_vec();
    p.extend_from_slice(&0u32.to_le_bytes());
    p.push(2);
    p.extend_from_slice(&44_100u32.to_le_bytes());
    p.extend_from_slice(&[0u8; 12]);
    p.push(0xB8);
    p.push(1);
    p
}

/// Headers plus `audio_pages` pages of 4 KiB packets.
fn sample_stream(audio_pages: usize) -> Vec<u8> {
    let fields: FieldStore = [("TITLE", "Bench"), ("ARTIST", "Criterion")].into_iter().collect();
    let comment = CommentPacket::new(CodecId::Vorbis, CommentBlock::from_fields("bench", &fields))
        .to_bytes()
        .unwrap();

    let mut w = PacketWriter::new(1, 0).beginning_of_stream(true);
    w.write_packet(&vorbis_ident(), 0);
    w.flush();
    w.write_packet(&comment, 0);
    w.flush();
    for i in 0..audio_pages {
        w.write_packet(&vec![i as u8; 4096], i as u64 * 1024);
        w.flush();
    }
    w.finish(true).iter().flat_map(Page::to_bytes).collect()
}

fn bench_crc(c: &mut Criterion) {
    let data = vec![0xA5u8; 1024 * 1024];
    c.bench_function("crc_1mb", |b| b.iter(|| checksum(black_box(&data))));
}

fn bench_paginate(c: &mut Criterion) {
    let packets: Vec<Vec<u8>> = (0..256).map(|i| vec![i as u8; 700 + i * 13]).collect();
    c.bench_function("paginate_256_packets", |b| {
        b.iter(|| {
            let mut w = PacketWriter::new(7, 0);
            for p in &packets {
                w.write_packet(black_box(p), 0);
            }
            w.finish(true)
        })
    });
}

fn bench_rewrite(c: &mut Criterion) {
    let input = sample_stream(256);
    let lyrics = "la ".repeat(30_000);

    c.bench_function("read_fields_1mb", |b| b.iter(|| read_fields(black_box(&input[..])).unwrap()));

    c.bench_function("rewrite_same_size_1mb", |b| {
        b.iter(|| rewrite_bytes(black_box(&input), &RewriteOptions::default(), |f| f.set("TITLE", "Bench")).unwrap())
    });

    c.bench_function("rewrite_grow_1mb", |b| {
        b.iter(|| {
            rewrite_bytes(black_box(&input), &RewriteOptions::default(), |f| f.set("LYRICS", lyrics.as_str()))
                .unwrap()
        })
    });
}

criterion_group!(benches, bench_crc, bench_paginate, bench_rewrite);
criterion_main!(benches);
