//! The deterministic draw function.
//!
//! `draw(id, year, stream, seed)` hashes the length-prefixed tuple
//! `(seed, year, stream tag, id)` with SHA-256 and scales the top 53 bits of
//! the digest to `[0, 1)`. The full identifier string is hashed, so
//! identifiers that share a length (`EMP_000001`, `EMP_000002`) land on
//! unrelated values.
//!
//! Draws are stateless: the same inputs give the same value regardless of
//! evaluation order or thread, which lets generators evaluate entities on a
//! `rayon` pool without affecting the result.

use sha2::{Digest, Sha256};

use workforce_types::{EmployeeId, EventKind};

/// Independent random streams.
///
/// Each stream has a distinct tag; effective dates never reuse the
/// selection stream of the same event kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DrawStream {
    /// Whether the event happens.
    Select(EventKind),
    /// Day of an experienced termination.
    TerminationDate,
    /// Day of a new-hire termination.
    NewHireTerminationDate,
}

impl DrawStream {
    /// Stable tag hashed into every draw of this stream.
    pub const fn tag(self) -> &'static str {
        match self {
            Self::Select(kind) => kind.tag(),
            Self::TerminationDate => "termination_date",
            Self::NewHireTerminationDate => "new_hire_termination_date",
        }
    }
}

/// SHA-256 of the length-prefixed `(seed, year, tag, id)` tuple.
fn digest(seed: u64, year: i32, tag: &str, id: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(8_u64.to_be_bytes());
    hasher.update(seed.to_be_bytes());
    hasher.update(4_u64.to_be_bytes());
    hasher.update(year.to_be_bytes());
    for part in [tag, id] {
        hasher.update(u64::try_from(part.len()).unwrap_or(u64::MAX).to_be_bytes());
        hasher.update(part.as_bytes());
    }
    hasher.finalize().into()
}

fn leading_u64(bytes: &[u8; 32]) -> u64 {
    bytes
        .first_chunk::<8>()
        .map_or(0, |chunk| u64::from_be_bytes(*chunk))
}

/// Uniform value in `[0, 1)` for `(seed, year, tag, id)`.
pub fn draw(seed: u64, year: i32, tag: &str, id: &EmployeeId) -> f64 {
    let bits = leading_u64(&digest(seed, year, tag, id.as_str())) >> 11;
    #[allow(clippy::cast_precision_loss)] // 53-bit integers are exact in f64.
    let value = bits as f64;
    value * (1.0 / 9_007_199_254_740_992.0)
}

/// 32-byte seed for a `ChaCha8` stream dedicated to `(seed, year, purpose)`.
pub fn derive_seed(seed: u64, year: i32, purpose: &str) -> [u8; 32] {
    digest(seed, year, purpose, "")
}

/// The draw function bound to a run seed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawFunction {
    seed: u64,
}

impl DrawFunction {
    /// Bind the draw function to a seed.
    pub const fn new(seed: u64) -> Self {
        Self { seed }
    }

    /// The run seed.
    pub const fn seed(self) -> u64 {
        self.seed
    }

    /// Uniform value in `[0, 1)`.
    pub fn draw(self, id: &EmployeeId, year: i32, stream: DrawStream) -> f64 {
        draw(self.seed, year, stream.tag(), id)
    }

    /// Uniform integer in `[0, span)`; zero when `span` is zero.
    pub fn offset(self, id: &EmployeeId, year: i32, stream: DrawStream, span: u64) -> u64 {
        leading_u64(&digest(self.seed, year, stream.tag(), id.as_str()))
            .checked_rem(span)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn draws_are_reproducible_and_in_range() {
        let f = DrawFunction::new(42);
        let id = EmployeeId::new("EMP_000001");
        let a = f.draw(&id, 2025, DrawStream::Select(EventKind::Termination));
        let b = f.draw(&id, 2025, DrawStream::Select(EventKind::Termination));
        assert!((a - b).abs() < f64::EPSILON);
        assert!((0.0..1.0).contains(&a));
    }

    #[test]
    fn equal_length_ids_get_different_draws() {
        let f = DrawFunction::new(42);
        let stream = DrawStream::Select(EventKind::Termination);
        let a = f.draw(&EmployeeId::new("EMP_000001"), 2025, stream);
        let b = f.draw(&EmployeeId::new("EMP_000002"), 2025, stream);
        let c = f.draw(&EmployeeId::new("EMP_000003"), 2025, stream);
        assert!((a - b).abs() > f64::EPSILON);
        assert!((b - c).abs() > f64::EPSILON);
        assert!((a - c).abs() > f64::EPSILON);
    }

    #[test]
    fn equal_length_ids_are_not_collapsed_across_a_population() {
        let f = DrawFunction::new(7);
        let stream = DrawStream::Select(EventKind::Promotion);
        let mut draws: Vec<f64> = (1..=1000)
            .map(|i| f.draw(&EmployeeId::new(format!("EMP_{i:06}")), 2025, stream))
            .collect();
        draws.sort_by(f64::total_cmp);
        draws.dedup_by(|a, b| (*a - *b).abs() < f64::EPSILON);
        assert_eq!(draws.len(), 1000);
    }

    #[test]
    fn streams_years_and_seeds_are_independent() {
        let id = EmployeeId::new("EMP_000001");
        let f = DrawFunction::new(42);
        let select = f.draw(&id, 2025, DrawStream::Select(EventKind::Termination));
        let date = f.draw(&id, 2025, DrawStream::TerminationDate);
        let next_year = f.draw(&id, 2026, DrawStream::Select(EventKind::Termination));
        let other_seed =
            DrawFunction::new(43).draw(&id, 2025, DrawStream::Select(EventKind::Termination));
        assert!((select - date).abs() > f64::EPSILON);
        assert!((select - next_year).abs() > f64::EPSILON);
        assert!((select - other_seed).abs() > f64::EPSILON);
    }

    #[test]
    fn draw_mean_is_near_one_half() {
        let f = DrawFunction::new(42);
        let stream = DrawStream::Select(EventKind::Merit);
        let total: f64 = (1..=10_000)
            .map(|i| f.draw(&EmployeeId::new(format!("EMP_{i:06}")), 2025, stream))
            .sum();
        let mean = total / 10_000.0;
        assert!((mean - 0.5).abs() < 0.02);
    }

    #[test]
    fn offsets_stay_below_span() {
        let f = DrawFunction::new(42);
        for i in 1..=200 {
            let id = EmployeeId::new(format!("EMP_{i:06}"));
            assert!(f.offset(&id, 2025, DrawStream::TerminationDate, 365) < 365);
        }
        let id = EmployeeId::new("EMP_000001");
        assert_eq!(f.offset(&id, 2025, DrawStream::TerminationDate, 0), 0);
    }

    #[test]
    fn derived_seeds_differ_by_purpose() {
        assert_ne!(derive_seed(42, 2025, "hire"), derive_seed(42, 2025, "baseline"));
        assert_ne!(derive_seed(42, 2025, "hire"), derive_seed(42, 2026, "hire"));
    }
}
