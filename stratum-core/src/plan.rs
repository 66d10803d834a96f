//! Size-bucket planning.
//!
//! Splits a byte budget into a heavy-tailed mix of file sizes: a few very
//! large files, some large and medium ones, and a long tail of small files.
//! Every stage consumes from the running remaining size / remaining count; a
//! stage that cannot fit its bucket simply stops early.

use crate::size::{GIB, KIB, MIB};
use rand::Rng;
use serde::Serialize;

pub const VERY_LARGE_MIN: u64 = 512 * MIB;
pub const LARGE_MIN: u64 = 10 * MIB;
pub const MEDIUM_MIN: u64 = 100 * KIB;
pub const SMALL_MIN: u64 = KIB;

const LARGE_CAP: usize = 20;
const MEDIUM_CAP: usize = 50;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Bucket {
    VeryLarge,
    Large,
    Medium,
    Small,
}

impl Bucket {
    pub fn classify(size: u64) -> Bucket {
        match size {
            s if s >= VERY_LARGE_MIN => Bucket::VeryLarge,
            s if s >= LARGE_MIN => Bucket::Large,
            s if s >= MEDIUM_MIN => Bucket::Medium,
            _ => Bucket::Small,
        }
    }

    /// Exclusive upper bound of the bucket, `None` for very-large.
    pub fn ceiling(self) -> Option<u64> {
        match self {
            Bucket::VeryLarge => None,
            Bucket::Large => Some(VERY_LARGE_MIN),
            Bucket::Medium => Some(LARGE_MIN),
            Bucket::Small => Some(MEDIUM_MIN),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SizeBucketPlan {
    pub very_large: Vec<u64>,
    pub large: Vec<u64>,
    pub medium: Vec<u64>,
    pub small: Vec<u64>,
}

impl SizeBucketPlan {
    pub fn total(&self) -> u64 {
        self.iter().sum()
    }

    pub fn len(&self) -> usize {
        self.very_large.len() + self.large.len() + self.medium.len() + self.small.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = u64> + '_ {
        self.very_large
            .iter()
            .chain(&self.large)
            .chain(&self.medium)
            .chain(&self.small)
            .copied()
    }

    /// Flatten into one list, largest buckets first.
    pub fn into_sizes(self) -> Vec<u64> {
        let mut all = Vec::with_capacity(self.len());
        all.extend(self.very_large);
        all.extend(self.large);
        all.extend(self.medium);
        all.extend(self.small);
        all
    }

    pub fn bucket(&self, b: Bucket) -> &[u64] {
        match b {
            Bucket::VeryLarge => &self.very_large,
            Bucket::Large => &self.large,
            Bucket::Medium => &self.medium,
            Bucket::Small => &self.small,
        }
    }

    fn bucket_mut(&mut self, b: Bucket) -> &mut Vec<u64> {
        match b {
            Bucket::VeryLarge => &mut self.very_large,
            Bucket::Large => &mut self.large,
            Bucket::Medium => &mut self.medium,
            Bucket::Small => &mut self.small,
        }
    }
}

/// Number of files to aim for when the caller gives none: about one per
/// 10 MiB, between 5 and 1000.
pub fn default_target_files(total: u64) -> usize {
    (total / (10 * MIB)).clamp(5, 1000) as usize
}

pub fn plan(total: u64, target_files: usize) -> SizeBucketPlan {
    plan_with_rng(total, target_files, &mut rand::thread_rng())
}

/// Random in `[lo, hi)`, or `lo` when the range is empty.
fn pick<R: Rng + ?Sized>(rng: &mut R, lo: u64, hi: u64) -> u64 {
    if hi > lo {
        rng.gen_range(lo..hi)
    } else {
        lo
    }
}

pub fn plan_with_rng<R: Rng + ?Sized>(total: u64, target_files: usize, rng: &mut R) -> SizeBucketPlan {
    let mut plan = SizeBucketPlan::default();
    let mut rem_size = total;
    let mut rem_files = target_files;

    // very large: 1-3 files, at most a quarter of the count
    if total >= GIB && rem_files > 10 {
        let n = rng.gen_range(1..=3usize).min(rem_files / 4);
        let max = total / 2;
        for _ in 0..n {
            if rem_size <= VERY_LARGE_MIN || rem_files == 0 {
                break;
            }
            let size = pick(rng, VERY_LARGE_MIN, max).min(rem_size / 2).max(VERY_LARGE_MIN);
            plan.very_large.push(size);
            rem_size -= size;
            rem_files -= 1;
        }
    }

    // large: 10% of the count, capped at 20
    if rem_files > 10 {
        let n = (rem_files / 10).min(LARGE_CAP);
        fill_bucket(&mut plan.large, n, LARGE_MIN, VERY_LARGE_MIN, &mut rem_size, &mut rem_files, rng);
    }

    // medium: 20% of the count, capped at 50
    if rem_files > 5 {
        let n = (rem_files / 5).min(MEDIUM_CAP);
        fill_bucket(&mut plan.medium, n, MEDIUM_MIN, LARGE_MIN, &mut rem_size, &mut rem_files, rng);
    }

    // small: whatever is left
    while rem_files > 0 && rem_size > SMALL_MIN {
        let max = MEDIUM_MIN.min(rem_size / rem_files as u64);
        let size = if max <= SMALL_MIN {
            rem_files = 1;
            rem_size
        } else {
            rng.gen_range(SMALL_MIN..max)
        };
        plan.small.push(size);
        rem_size -= size;
        rem_files -= 1;
    }

    if rem_size > 0 {
        fold_remainder(&mut plan, rem_size, target_files);
    }
    plan
}

/// Sizes bounded above by twice the running per-file average and by the
/// bucket ceiling; stops once that bound falls under the bucket floor.
fn fill_bucket<R: Rng + ?Sized>(
    out: &mut Vec<u64>,
    n: usize,
    floor: u64,
    ceiling: u64,
    rem_size: &mut u64,
    rem_files: &mut usize,
    rng: &mut R,
) {
    for _ in 0..n {
        if *rem_size <= floor || *rem_files == 0 {
            break;
        }
        let avg = *rem_size / *rem_files as u64;
        let max = if avg < ceiling { avg.saturating_mul(2).min(ceiling) } else { ceiling };
        if max < floor {
            break;
        }
        let size = pick(rng, floor, max).min(*rem_size);
        out.push(size);
        *rem_size -= size;
        *rem_files -= 1;
    }
}

/// Bucket a remainder-only entry belongs to. Very-large needs a 1 GiB plan.
fn home_bucket(size: u64, total: u64) -> Bucket {
    match Bucket::classify(size) {
        Bucket::VeryLarge if total < GIB => Bucket::Large,
        b => b,
    }
}

/// Largest size an existing entry may grow to while absorbing a remainder.
fn entry_limit(bucket: Bucket, total: u64) -> u64 {
    match bucket.ceiling() {
        Some(c) => c - 1,
        None => (total / 2).max(VERY_LARGE_MIN),
    }
}

fn fold_remainder(plan: &mut SizeBucketPlan, rem: u64, target_files: usize) {
    let total = plan.total() + rem;
    if plan.is_empty() {
        plan.bucket_mut(home_bucket(rem, total)).push(rem);
        return;
    }
    if plan.len() < target_files {
        match plan.small.last_mut() {
            Some(last) if *last + rem < MEDIUM_MIN => *last += rem,
            _ => plan.bucket_mut(home_bucket(rem, total)).push(rem),
        }
        return;
    }

    // No count budget left: spread over existing entries, smallest bucket
    // first, never pushing an entry past its bucket.
    let mut rem = rem;
    for bucket in [Bucket::Small, Bucket::Medium, Bucket::Large, Bucket::VeryLarge] {
        let limit = entry_limit(bucket, total);
        for size in plan.bucket_mut(bucket).iter_mut().rev() {
            let add = limit.saturating_sub(*size).min(rem);
            *size += add;
            rem -= add;
            if rem == 0 {
                return;
            }
        }
    }

    // Every entry is full; the largest absorbs the rest and is re-bucketed.
    let largest = [Bucket::VeryLarge, Bucket::Large, Bucket::Medium, Bucket::Small]
        .into_iter()
        .flat_map(|b| plan.bucket(b).iter().enumerate().map(move |(i, &s)| (s, b, i)))
        .max_by_key(|&(s, _, _)| s);
    if let Some((_, bucket, pos)) = largest {
        let grown = plan.bucket_mut(bucket).remove(pos) + rem;
        plan.bucket_mut(home_bucket(grown, total)).push(grown);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn seeded(seed: u64) -> StdRng {
        StdRng::seed_from_u64(seed)
    }

    fn assert_ranges(p: &SizeBucketPlan) {
        assert!(p.very_large.iter().all(|&s| s >= VERY_LARGE_MIN));
        assert!(p.large.iter().all(|&s| (LARGE_MIN..VERY_LARGE_MIN).contains(&s)));
        assert!(p.medium.iter().all(|&s| (MEDIUM_MIN..LARGE_MIN).contains(&s)));
        // all but a final absorbing entry
        let rest = p.small.split_last().map_or(&[][..], |(_, rest)| rest);
        assert!(rest.iter().all(|&s| (SMALL_MIN..MEDIUM_MIN).contains(&s)));
    }

    #[test]
    fn sums_exactly_for_typical_budgets() {
        for (total, count) in [(10 * KIB, 3), (5 * MIB, 5), (100 * MIB, 10), (3 * GIB, 300)] {
            for seed in 0..20 {
                let p = plan_with_rng(total, count, &mut seeded(seed));
                assert_eq!(p.total(), total, "total={total} count={count} seed={seed}");
                assert!(p.len() <= count, "{} > {count}", p.len());
            }
        }
    }

    #[test]
    fn very_large_only_for_gib_budgets() {
        for seed in 0..20 {
            let big = plan_with_rng(2 * GIB, 100, &mut seeded(seed));
            assert!(!big.very_large.is_empty());
            assert_ranges(&big);
            let small = plan_with_rng(GIB - 1, 100, &mut seeded(seed));
            assert!(small.very_large.is_empty());
        }
    }

    #[test]
    fn exactly_one_gib_does_not_panic() {
        let p = plan_with_rng(GIB, 50, &mut seeded(7));
        assert_eq!(p.very_large, vec![VERY_LARGE_MIN]);
        assert_eq!(p.total(), GIB);
    }

    #[test]
    fn tiny_budgets_still_sum() {
        assert_eq!(plan_with_rng(0, 5, &mut seeded(1)).len(), 0);
        let p = plan_with_rng(500, 5, &mut seeded(1));
        assert_eq!(p.small, vec![500]);
        let p = plan_with_rng(4 * KIB, 0, &mut seeded(1));
        assert_eq!(p.total(), 4 * KIB);
        assert_eq!(p.len(), 1);
        let p = plan_with_rng(800 * MIB, 0, &mut seeded(1));
        assert_eq!(p.large, vec![800 * MIB]);
    }

    #[test]
    fn lean_budget_absorbs_into_last_small() {
        // 5 files over 3 KiB: average drops to 1 KiB quickly
        let p = plan_with_rng(3 * KIB, 5, &mut seeded(3));
        assert_eq!(p.total(), 3 * KIB);
        assert!(p.large.is_empty() && p.very_large.is_empty());
    }

    #[test]
    fn spent_count_folds_into_existing_entry() {
        let mut p = SizeBucketPlan { small: vec![2 * KIB, 3 * KIB], ..Default::default() };
        fold_remainder(&mut p, 500, 2);
        assert_eq!(p.small, vec![2 * KIB, 3 * KIB + 500]);

        // small tops out just under its ceiling, medium takes the rest
        let mut p = SizeBucketPlan {
            medium: vec![200 * KIB],
            small: vec![99 * KIB],
            ..Default::default()
        };
        fold_remainder(&mut p, 50 * KIB, 2);
        let spill = MEDIUM_MIN - 1 - 99 * KIB;
        assert_eq!(p.small, vec![MEDIUM_MIN - 1]);
        assert_eq!(p.medium, vec![250 * KIB - spill]);
        assert_eq!(p.total(), 349 * KIB);
    }

    #[test]
    fn overflowing_remainder_moves_entry_to_its_bucket() {
        let mut p = SizeBucketPlan { small: vec![60 * KIB, 90 * KIB], ..Default::default() };
        fold_remainder(&mut p, MIB, 2);
        assert_eq!(p.total(), 150 * KIB + MIB);
        assert_eq!(p.len(), 2);
        assert_eq!(p.small, vec![MEDIUM_MIN - 1]);
        assert_eq!(p.medium, vec![150 * KIB + MIB - (MEDIUM_MIN - 1)]);
    }

    #[test]
    fn exhausted_small_plans_keep_bucket_ranges() {
        for seed in 0..500 {
            let p = plan_with_rng(7 * MIB, 300, &mut seeded(seed));
            assert_eq!(p.total(), 7 * MIB);
            assert!(p.len() <= 300);
            assert!(p.small.iter().all(|&s| s < MEDIUM_MIN), "seed {seed}: {:?}", p.small);
            assert_ranges(&p);
        }
    }

    #[test]
    fn classify_matches_bucket_bounds() {
        assert_eq!(Bucket::classify(0), Bucket::Small);
        assert_eq!(Bucket::classify(MEDIUM_MIN - 1), Bucket::Small);
        assert_eq!(Bucket::classify(MEDIUM_MIN), Bucket::Medium);
        assert_eq!(Bucket::classify(LARGE_MIN), Bucket::Large);
        assert_eq!(Bucket::classify(VERY_LARGE_MIN), Bucket::VeryLarge);
    }

    #[test]
    fn default_target_is_clamped() {
        assert_eq!(default_target_files(0), 5);
        assert_eq!(default_target_files(100 * MIB), 10);
        assert_eq!(default_target_files(100 * GIB), 1000);
    }
}
