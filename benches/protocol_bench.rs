use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tn5250e::lib5250::codes::{CC2_UNLOCK, CMD_CLEAR_UNIT, CMD_WRITE_TO_DISPLAY, ESC, SBA, SF};
use tn5250e::lib5250::telnet::escape;
use tn5250e::lib5250::{build_record, frame_record, OrderDecoder, ScreenState, TelnetNegotiator};
use tn5250e::protocol_common::Cp037Converter;
use tn5250e::{ProtocolSession, SessionConfig};

/// Full 24x80 panel: every row labelled, an input field on each row.
fn panel() -> Vec<u8> {
    let mut data = vec![ESC, CMD_CLEAR_UNIT, ESC, CMD_WRITE_TO_DISPLAY, 0x00, CC2_UNLOCK];
    for row in 1..=24u8 {
        data.extend_from_slice(&[SBA, row, 1]);
        // "OPTION" in EBCDIC
        data.extend_from_slice(&[0xD6, 0xD7, 0xE3, 0xC9, 0xD6, 0xD5]);
        data.extend_from_slice(&[SBA, row, 20, SF, 0x40, 0x00, 0x20, 0x00, 0x28]);
    }
    build_record(0, 0x03, &data)
}

fn bench_decode_panel(c: &mut Criterion) {
    let record = panel();
    c.bench_function("decode_panel", |b| {
        b.iter(|| {
            let mut decoder = OrderDecoder::new(Arc::new(Cp037Converter), "IBM-3179-2");
            let mut screen = ScreenState::new(24, 80);
            black_box(decoder.decode_record(black_box(&record), &mut screen)).unwrap();
        })
    });
}

fn bench_telnet_unescape(c: &mut Criterion) {
    let data: Vec<u8> = (0..=255u8).cycle().take(4096).collect();
    let wire = escape(&data);
    c.bench_function("telnet_unescape_4k", |b| {
        b.iter(|| {
            let mut telnet = TelnetNegotiator::new(&SessionConfig::default());
            black_box(telnet.process(black_box(&wire))).unwrap();
        })
    });
}

fn bench_session_round_trip(c: &mut Criterion) {
    let framed = frame_record(&panel());
    c.bench_function("session_round_trip", |b| {
        b.iter(|| {
            let session = ProtocolSession::new(SessionConfig::default()).unwrap();
            session.receive(black_box(&framed)).unwrap();
            black_box(session.submit("QSECOFR[tab]SECRET[enter]"));
        })
    });
}

criterion_group!(benches, bench_decode_panel, bench_telnet_unescape, bench_session_round_trip);
criterion_main!(benches);
