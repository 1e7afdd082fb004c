use criterion::{black_box, criterion_group, criterion_main, Criterion};

use tapquest_core::{verify_tap, Secp256k1LowS, SigCardScheme};
use tapquest_testkit::{HashAuthenticator, SignatureCard};

fn bench_sig_card(c: &mut Criterion) {
    let card = SignatureCard::from_seed(&[0x11; 32]);
    let message = [0u8, 0, 0, 42, 1, 2, 3, 4];
    let public_key = card.public_key_hex();
    let message_hex = hex::encode(message);
    let raw = hex::encode(card.sign_high_s(&message).to_bytes());
    let normalized = hex::encode(card.sign_low_s(&message).to_bytes());
    let scheme = Secp256k1LowS;

    c.bench_function("sig_card_normalize", |b| {
        b.iter(|| scheme.normalize(black_box(&raw)))
    });

    c.bench_function("sig_card_verify", |b| {
        b.iter(|| scheme.verify(black_box(&public_key), black_box(&message_hex), black_box(&normalized)))
    });

    let tap = card.tap(&message);
    c.bench_function("verify_tap_sig_card", |b| {
        b.iter(|| verify_tap(black_box(&tap), &HashAuthenticator, &scheme))
    });

    let chip = HashAuthenticator::tap_params("04a1b2c3d4e5f6", 42);
    c.bench_function("verify_tap_chip", |b| {
        b.iter(|| verify_tap(black_box(&chip), &HashAuthenticator, &scheme))
    });
}

criterion_group!(benches, bench_sig_card);
criterion_main!(benches);
