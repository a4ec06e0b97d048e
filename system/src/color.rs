use crate::types::Color;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::ops::RangeInclusive;

const HUE: RangeInclusive<u16> = 0..=359;
// Vivid, mid-lightness colors stay readable on a light grey canvas.
const SATURATION: RangeInclusive<u8> = 65..=95;
const LIGHTNESS: RangeInclusive<u8> = 45..=65;

pub const DEFAULT_MAX_ATTEMPTS: usize = 10;

/// Hands out session colors while trying to keep them distinct from the ones
/// currently on screen. Uniqueness is best effort: once `max_attempts`
/// candidates have all collided, the last one is used anyway.
#[derive(Debug)]
pub struct ColorAllocator<R = StdRng> {
    rng: R,
    max_attempts: usize,
    in_use: HashMap<Color, usize>,
}

impl ColorAllocator<StdRng> {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy(), DEFAULT_MAX_ATTEMPTS)
    }
}

impl Default for ColorAllocator<StdRng> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Rng> ColorAllocator<R> {
    pub fn with_rng(rng: R, max_attempts: usize) -> Self {
        Self {
            rng,
            max_attempts: max_attempts.max(1),
            in_use: HashMap::new(),
        }
    }

    /// Picks a color outside the in-use set and marks it used.
    pub fn allocate(&mut self) -> Color {
        let in_use = &self.in_use;
        let color = pick_color(&mut self.rng, self.max_attempts, |c| in_use.contains_key(c));
        *self.in_use.entry(color).or_insert(0) += 1;
        color
    }

    pub fn release(&mut self, color: &Color) {
        if let Some(count) = self.in_use.get_mut(color) {
            *count -= 1;
            if *count == 0 {
                self.in_use.remove(color);
            }
        }
    }

    pub fn is_in_use(&self, color: &Color) -> bool {
        self.in_use.contains_key(color)
    }

    pub fn in_use_count(&self) -> usize {
        self.in_use.len()
    }
}

pub fn random_color<R: Rng>(rng: &mut R) -> Color {
    Color::new(
        rng.gen_range(HUE),
        rng.gen_range(SATURATION),
        rng.gen_range(LIGHTNESS),
    )
}

/// Samples up to `max_attempts` colors and returns the first free one, or the
/// last sample if none was free.
pub fn pick_color<R, F>(rng: &mut R, max_attempts: usize, is_taken: F) -> Color
where
    R: Rng,
    F: Fn(&Color) -> bool,
{
    let mut candidate = random_color(rng);
    for _ in 1..max_attempts {
        if !is_taken(&candidate) {
            return candidate;
        }
        candidate = random_color(rng);
    }
    if is_taken(&candidate) {
        log::debug!(
            "Accepting duplicate color {} after {} attempts",
            candidate,
            max_attempts
        );
    }
    candidate
}
