// src/utils/challenge.rs
//! Replay-protection challenges.
//!
//! A challenge is a Unix timestamp drawn uniformly from
//! `[now - CHALLENGE_WINDOW_SECS, now + CHALLENGE_WINDOW_SECS]`. Draws use
//! rejection sampling over OS randomness so that no offset is favoured.

use rand::rngs::OsRng;
use rand::RngCore;

/// Half-width of the challenge window in seconds.
pub const CHALLENGE_WINDOW_SECS: i64 = 60;

/// Challenge values are Unix timestamps in seconds.
pub type Challenge = i64;

/// Whether `challenge` fits the signed 32-bit range carried on the wire.
pub fn challenge_in_range(challenge: Challenge) -> bool {
    i32::try_from(challenge).is_ok()
}

/// Draws a fresh challenge around the current time.
pub fn generate_challenge() -> Challenge {
    generate_challenge_at(&mut OsRng, chrono::Utc::now().timestamp())
}

/// Draws a challenge around `now` from the given randomness source.
pub fn generate_challenge_at<R: RngCore + ?Sized>(rng: &mut R, now: i64) -> Challenge {
    let range = (2 * CHALLENGE_WINDOW_SECS + 1) as u64;
    now - CHALLENGE_WINDOW_SECS + uniform_below(rng, range) as i64
}

/// Uniform integer in `[0, range)`.
///
/// Random bytes are masked down to the bit length of `range - 1` and redrawn
/// while the value is out of range, which avoids modulo bias.
pub fn uniform_below<R: RngCore + ?Sized>(rng: &mut R, range: u64) -> u64 {
    assert!(range > 0, "range must be non-zero");
    if range == 1 {
        return 0;
    }

    let bits = 64 - (range - 1).leading_zeros();
    let byte_len = ((bits + 7) / 8) as usize;
    let mask = if bits == 64 { u64::MAX } else { (1u64 << bits) - 1 };

    let mut buf = [0u8; 8];
    loop {
        rng.fill_bytes(&mut buf[..byte_len]);
        let value = u64::from_le_bytes(buf) & mask;
        if value < range {
            return value;
        }
    }
}
