//! Gaming helpers
//!
//! Scripted patterns and humanization built on the [`Session`] command
//! surface. Nothing here keeps state between calls; randomness comes from
//! the thread-local generator unless a caller passes its own.

use rand::Rng;
use std::thread;
use std::time::{Duration, Instant};

use crate::protocol::{KeyCode, MouseButton, ProtocolError};
use crate::session::Session;

/// Apply relative movements in order, pausing `interval_ms` after each
pub fn perform_recoil_control(
    session: &Session,
    pattern: &[(i32, i32)],
    interval_ms: u32,
) -> Result<(), ProtocolError> {
    let interval = Duration::from_millis(u64::from(interval_ms));
    for &(dx, dy) in pattern {
        session.mouse_move(dx, dy)?;
        thread::sleep(interval);
    }
    Ok(())
}

/// Single-click each button in order, pausing `interval_ms` after each
pub fn perform_click_sequence(
    session: &Session,
    buttons: &[MouseButton],
    interval_ms: u32,
) -> Result<(), ProtocolError> {
    let interval = Duration::from_millis(u64::from(interval_ms));
    for &button in buttons {
        session.mouse_click(button, 1)?;
        thread::sleep(interval);
    }
    Ok(())
}

/// Press each key in order, pausing `interval_ms` after each
pub fn perform_key_sequence(
    session: &Session,
    keys: &[KeyCode],
    interval_ms: u32,
) -> Result<(), ProtocolError> {
    let interval = Duration::from_millis(u64::from(interval_ms));
    for &key in keys {
        session.key_press(key, 0)?;
        thread::sleep(interval);
    }
    Ok(())
}

/// Click `button` every `interval_ms` until `duration_ms` has elapsed.
///
/// Returns the number of clicks sent. Stops at the first failed write.
pub fn auto_click(
    session: &Session,
    button: MouseButton,
    interval_ms: u32,
    duration_ms: u32,
) -> Result<u32, ProtocolError> {
    let interval = Duration::from_millis(u64::from(interval_ms));
    let deadline = Instant::now() + Duration::from_millis(u64::from(duration_ms));
    let mut clicks = 0;

    while Instant::now() < deadline {
        session.mouse_click(button, 1)?;
        clicks += 1;
        thread::sleep(interval);
    }

    tracing::debug!("auto_click: {} clicks of {}", clicks, button);
    Ok(clicks)
}

/// `base` plus uniform jitter in `[-variance, variance]`, never below 1
pub fn humanize_delay(base: u32, variance: u32) -> u32 {
    humanize_delay_with_rng(&mut rand::thread_rng(), base, variance)
}

/// [`humanize_delay`] drawing from `rng`
///
/// ```
/// use makcu_core::gaming::humanize_delay_with_rng;
/// use rand::rngs::StdRng;
/// use rand::SeedableRng;
///
/// let mut rng = StdRng::seed_from_u64(7);
/// let delay = humanize_delay_with_rng(&mut rng, 50, 10);
/// assert!((40..=60).contains(&delay));
/// ```
pub fn humanize_delay_with_rng<R: Rng + ?Sized>(rng: &mut R, base: u32, variance: u32) -> u32 {
    let variance = i64::from(variance);
    let offset = rng.gen_range(-variance..=variance);
    let delay = (i64::from(base) + offset).clamp(1, i64::from(u32::MAX));
    delay as u32
}

/// Add independent jitter in `[-variance, variance]` to each axis
pub fn humanize_movement(x: i32, y: i32, variance: u32) -> (i32, i32) {
    humanize_movement_with_rng(&mut rand::thread_rng(), x, y, variance)
}

/// [`humanize_movement`] drawing from `rng`
pub fn humanize_movement_with_rng<R: Rng + ?Sized>(
    rng: &mut R,
    x: i32,
    y: i32,
    variance: u32,
) -> (i32, i32) {
    let variance = i32::try_from(variance).unwrap_or(i32::MAX);
    let mut jitter = |v: i32| v.saturating_add(rng.gen_range(-variance..=variance));
    let x = jitter(x);
    let y = jitter(y);
    (x, y)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_humanize_delay_bounds() {
        for _ in 0..1000 {
            let d = humanize_delay(100, 20);
            assert!((80..=120).contains(&d), "delay {} out of range", d);
        }
    }

    #[test]
    fn test_humanize_delay_floor() {
        for _ in 0..200 {
            assert!(humanize_delay(1, 50) >= 1);
        }
        assert_eq!(humanize_delay(0, 0), 1);
        assert_eq!(humanize_delay(40, 0), 40);
    }

    #[test]
    fn test_humanize_movement_bounds() {
        for _ in 0..1000 {
            let (x, y) = humanize_movement(100, 50, 5);
            assert!((95..=105).contains(&x), "x {} out of range", x);
            assert!((45..=55).contains(&y), "y {} out of range", y);
        }
    }

    #[test]
    fn test_seeded_rng_is_repeatable() {
        let mut a = StdRng::seed_from_u64(7);
        let mut b = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            assert_eq!(
                humanize_delay_with_rng(&mut a, 200, 30),
                humanize_delay_with_rng(&mut b, 200, 30)
            );
            assert_eq!(
                humanize_movement_with_rng(&mut a, -10, 10, 3),
                humanize_movement_with_rng(&mut b, -10, 10, 3)
            );
        }
    }
}
