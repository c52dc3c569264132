use rand::rngs::StdRng;
use rand::{Rng as _, SeedableRng as _};

use super::repeats::PhaseRepeats;

/// Discipline that decides which phase runs next.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Pattern {
    /// Every repeat of phase `i` before phase `i + 1`.
    #[default]
    Sequence,
    /// Round-robin over phases until all repeat budgets are spent.
    Cycle,
    /// Uniform choice among phases with budget left.
    Random,
}

impl Pattern {
    /// Plan files are lenient: unknown or empty values fall back to `sequence`.
    pub fn from_plan_value(value: Option<&str>) -> Self {
        let Some(raw) = value.map(str::trim).filter(|v| !v.is_empty()) else {
            return Self::Sequence;
        };
        match raw.parse() {
            Ok(p) => p,
            Err(_) => {
                tracing::warn!(pattern = raw, "unknown phase pattern, falling back to sequence");
                Self::Sequence
            }
        }
    }
}

#[derive(Debug)]
pub enum PatternExecutor {
    Sequence,
    Cycle,
    Random { rng: StdRng },
}

impl PatternExecutor {
    pub fn new(pattern: Pattern) -> Self {
        match pattern {
            Pattern::Sequence => Self::Sequence,
            Pattern::Cycle => Self::Cycle,
            Pattern::Random => Self::Random {
                rng: StdRng::from_entropy(),
            },
        }
    }

    /// Random executor with a fixed seed, for reproducible runs.
    pub fn seeded_random(seed: u64) -> Self {
        Self::Random {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Picks the phase to run after `current`, or `None` once the run is over.
    ///
    /// `current` may already be exhausted (e.g. right after its last repeat).
    pub fn next_phase(
        &mut self,
        current: usize,
        executions: &[u32],
        repeats: &PhaseRepeats,
    ) -> Option<usize> {
        let n = executions.len();
        if n == 0 {
            return None;
        }

        match self {
            Self::Sequence => (current.min(n)..n).find(|&i| has_budget(i, executions, repeats)),
            Self::Cycle => (1..=n)
                .map(|step| (current + step) % n)
                .find(|&i| has_budget(i, executions, repeats)),
            Self::Random { rng } => {
                let eligible: Vec<usize> = (0..n)
                    .filter(|&i| has_budget(i, executions, repeats))
                    .collect();
                if eligible.is_empty() {
                    return None;
                }
                Some(eligible[rng.gen_range(0..eligible.len())])
            }
        }
    }

    /// Whether the driver should leave `current` after the execution that just finished.
    pub fn should_advance_phase(
        &self,
        current: usize,
        executions: &[u32],
        repeats: &PhaseRepeats,
    ) -> bool {
        match self {
            Self::Sequence => !has_budget(current, executions, repeats),
            Self::Cycle | Self::Random { .. } => true,
        }
    }

    pub fn is_complete(&self, executions: &[u32], repeats: &PhaseRepeats) -> bool {
        (0..executions.len()).all(|i| !has_budget(i, executions, repeats))
    }
}

fn has_budget(phase: usize, executions: &[u32], repeats: &PhaseRepeats) -> bool {
    executions
        .get(phase)
        .is_some_and(|&done| done < repeats.repeat(phase))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drive(executor: &mut PatternExecutor, repeats: &PhaseRepeats, phases: usize) -> Vec<usize> {
        let mut executions = vec![0u32; phases];
        let mut order = Vec::new();
        let mut current = 0usize;

        loop {
            if executions[current] >= repeats.repeat(current) {
                match executor.next_phase(current, &executions, repeats) {
                    Some(next) => {
                        current = next;
                        continue;
                    }
                    None => break,
                }
            }

            order.push(current);
            executions[current] += 1;

            if executor.should_advance_phase(current, &executions, repeats) {
                match executor.next_phase(current, &executions, repeats) {
                    Some(next) => current = next,
                    None => break,
                }
            }
        }

        assert!(executor.is_complete(&executions, repeats));
        order
    }

    #[test]
    fn pattern_parses_case_insensitively() {
        assert_eq!("cycle".parse::<Pattern>().ok(), Some(Pattern::Cycle));
        assert_eq!("RANDOM".parse::<Pattern>().ok(), Some(Pattern::Random));
        assert!("zigzag".parse::<Pattern>().is_err());
    }

    #[test]
    fn unknown_plan_pattern_falls_back_to_sequence() {
        assert_eq!(Pattern::from_plan_value(Some("zigzag")), Pattern::Sequence);
        assert_eq!(Pattern::from_plan_value(Some("")), Pattern::Sequence);
        assert_eq!(Pattern::from_plan_value(None), Pattern::Sequence);
        assert_eq!(Pattern::from_plan_value(Some("cycle")), Pattern::Cycle);
    }

    #[test]
    fn sequence_exhausts_each_phase_before_moving_on() {
        let repeats = PhaseRepeats::uniform(2);
        let order = drive(&mut PatternExecutor::new(Pattern::Sequence), &repeats, 3);
        assert_eq!(order, vec![0, 0, 1, 1, 2, 2]);
    }

    #[test]
    fn sequence_is_terminal_after_last_phase() {
        let repeats = PhaseRepeats::uniform(1);
        let mut executor = PatternExecutor::new(Pattern::Sequence);
        assert_eq!(executor.next_phase(2, &[1, 1, 1], &repeats), None);
        assert_eq!(executor.next_phase(0, &[1, 0, 0], &repeats), Some(1));
    }

    #[test]
    fn cycle_round_robins_phases() {
        let repeats = PhaseRepeats::uniform(2);
        let mut executor = PatternExecutor::new(Pattern::Cycle);
        let order = drive(&mut executor, &repeats, 3);
        assert_eq!(order, vec![0, 1, 2, 0, 1, 2]);
    }

    #[test]
    fn cycle_is_not_complete_until_every_phase_is_exhausted() {
        let repeats = PhaseRepeats::uniform(2);
        let executor = PatternExecutor::new(Pattern::Cycle);

        let mut executions = vec![0u32; 3];
        for (step, phase) in [0usize, 1, 2, 0, 1, 2].into_iter().enumerate() {
            assert!(
                !executor.is_complete(&executions, &repeats),
                "complete too early at step {step}"
            );
            executions[phase] += 1;
        }
        assert!(executor.is_complete(&executions, &repeats));
    }

    #[test]
    fn cycle_skips_exhausted_phases() {
        let mut repeats = PhaseRepeats::uniform(1);
        repeats.set_repeat(2, 3);
        let mut executor = PatternExecutor::new(Pattern::Cycle);

        // Phases 0 and 1 are done; 2 still has budget.
        assert_eq!(executor.next_phase(2, &[1, 1, 1], &repeats), Some(2));
        assert_eq!(executor.next_phase(0, &[1, 1, 3], &repeats), None);
    }

    #[test]
    fn random_respects_budgets_and_terminates_exactly() {
        let repeats = PhaseRepeats::uniform(100);

        for seed in 0..10u64 {
            let mut executor = PatternExecutor::seeded_random(seed);
            let mut executions = vec![0u32; 3];
            let mut current = 0usize;
            let mut total = 0u32;

            while let Some(next) = executor.next_phase(current, &executions, &repeats) {
                assert!(
                    executions[next] < 100,
                    "phase {next} selected after exhausting its budget"
                );
                executions[next] += 1;
                current = next;
                total += 1;
            }

            assert_eq!(total, 300);
            assert_eq!(executions, vec![100, 100, 100]);
            assert!(executor.is_complete(&executions, &repeats));
        }
    }

    #[test]
    fn random_never_exceeds_budget_over_many_trials() {
        let repeats = PhaseRepeats::uniform(100);
        let mut executor = PatternExecutor::seeded_random(7);
        let mut executions = vec![0u32; 3];

        for _ in 0..10_000 {
            match executor.next_phase(0, &executions, &repeats) {
                Some(next) => {
                    assert!(executions[next] < 100);
                    executions[next] += 1;
                }
                None => {
                    assert_eq!(executions, vec![100, 100, 100]);
                    break;
                }
            }
        }

        assert_eq!(executor.next_phase(0, &executions, &repeats), None);
    }

    #[test]
    fn random_selection_is_uniform_over_eligible_phases() {
        // Phase 0 has far more budget left; selection must not be weighted by it.
        let mut repeats = PhaseRepeats::uniform(10_000);
        repeats.set_repeat(1, 10_000);
        let executions = vec![0u32, 9_000];
        let mut executor = PatternExecutor::seeded_random(42);

        let mut hits = [0u32; 2];
        for _ in 0..2_000 {
            if let Some(i) = executor.next_phase(0, &executions, &repeats) {
                hits[i] += 1;
            }
        }

        assert!(hits[0] > 800 && hits[1] > 800, "skewed selection: {hits:?}");
    }
}
