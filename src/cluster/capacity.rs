use crate::model::DEFAULT_MAX_THREADS_PER_AGENT;

/// Agents needed to carry `num_threads` at `max_threads_per_agent` each.
pub fn required_agent_count(num_threads: u32, max_threads_per_agent: u32) -> u32 {
    if max_threads_per_agent == 0 {
        return 0;
    }
    num_threads.div_ceil(max_threads_per_agent)
}

/// Snaps a thread budget onto the published bands: multiples of 5 up to
/// 10, of 10 up to 50, of 50 above that. Rounds to the nearest band value,
/// ties upward.
pub fn round_off_max_threads_per_agent(threads: u32) -> u32 {
    let unit: u32 = if threads <= 10 {
        5
    } else if threads <= 50 {
        10
    } else {
        50
    };
    ((threads + unit / 2) / unit).max(1) * unit
}

/// Canonical EC2 size ladder, smallest first.
const INSTANCE_SIZES: [&str; 19] = [
    "nano", "micro", "small", "medium", "large", "xlarge", "2xlarge", "3xlarge", "4xlarge",
    "6xlarge", "8xlarge", "9xlarge", "10xlarge", "12xlarge", "16xlarge", "18xlarge", "24xlarge",
    "32xlarge", "metal",
];

pub const MIN_THREADS_PER_AGENT: u32 = 3;
pub const MAX_THREADS_PER_AGENT: u32 = 10_000;

/// Default thread budget for an instance type, derived from its size:
/// doubles per size step from a floor of 3, snapped onto the bands and
/// clamped to [3, 10000]. Unknown sizes fall back to the project default.
pub fn default_max_threads_per_agent(instance_type: &str) -> u32 {
    let size = instance_type.split('.').nth(1).unwrap_or_default();
    let Some(index) = INSTANCE_SIZES.iter().position(|known| *known == size) else {
        return DEFAULT_MAX_THREADS_PER_AGENT;
    };
    let raw = MIN_THREADS_PER_AGENT.saturating_mul(1u32 << index.min(20));
    round_off_max_threads_per_agent(raw.clamp(MIN_THREADS_PER_AGENT, MAX_THREADS_PER_AGENT))
        .clamp(MIN_THREADS_PER_AGENT, MAX_THREADS_PER_AGENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounding_boundary_table() {
        let cases = [
            (4, 5),
            (5, 5),
            (8, 10),
            (11, 10),
            (15, 20),
            (44, 40),
            (45, 50),
            (51, 50),
            (75, 100),
            (155, 150),
            (375, 400),
        ];
        for (input, expected) in cases {
            assert_eq!(
                round_off_max_threads_per_agent(input),
                expected,
                "round_off({input})"
            );
        }
    }

    #[test]
    fn rounding_is_idempotent_and_floors_small_inputs() {
        for input in 1..=600 {
            let once = round_off_max_threads_per_agent(input);
            assert_eq!(round_off_max_threads_per_agent(once), once, "f(f({input}))");
            assert!(once > 0);
        }
        for input in 1..=5 {
            assert!(round_off_max_threads_per_agent(input) >= input);
        }
    }

    #[test]
    fn required_count_matches_ceiling_division() {
        assert_eq!(required_agent_count(150, 100), 2);
        assert_eq!(required_agent_count(100, 100), 1);
        assert_eq!(required_agent_count(101, 100), 2);
        assert_eq!(required_agent_count(0, 100), 0);
    }

    #[test]
    fn required_count_is_monotonic_in_threads() {
        let mut previous = 0;
        for threads in 0..2_000 {
            let count = required_agent_count(threads, 50);
            assert!(count >= previous);
            previous = count;
        }
    }

    #[test]
    fn instance_defaults_grow_with_size_and_stay_in_range() {
        let ladder = [
            "c5.nano", "c5.micro", "c5.small", "c5.medium", "c5.large", "c5.xlarge",
            "c5.2xlarge", "c5.4xlarge", "c5.8xlarge", "c5.12xlarge", "c5.16xlarge",
            "c5.24xlarge", "c5.metal",
        ];
        let mut previous = 0;
        for instance_type in ladder {
            let threads = default_max_threads_per_agent(instance_type);
            assert!(threads >= previous, "{instance_type}: {threads} < {previous}");
            assert!((MIN_THREADS_PER_AGENT..=MAX_THREADS_PER_AGENT).contains(&threads));
            previous = threads;
        }
    }

    #[test]
    fn unknown_instance_sizes_use_the_project_default() {
        assert_eq!(default_max_threads_per_agent("z9.quantum"), 50);
        assert_eq!(default_max_threads_per_agent("malformed"), 50);
    }
}
