use std::fmt;

/// Aggregated evaluation of the rows seen during a phase.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct Progress {
    pub num_examples: usize,
    /// The summed objective over every example.
    pub objective: f64,
    /// Examples whose predicted sign matches the label.
    pub correct: usize,
}

impl Progress {
    /// Adds `other` into `self`.
    pub fn merge(&mut self, other: &Progress) {
        self.num_examples += other.num_examples;
        self.objective += other.objective;
        self.correct += other.correct;
    }

    /// The objective per example, 0 without examples.
    pub fn mean_objective(&self) -> f64 {
        if self.num_examples == 0 {
            return 0.;
        }

        self.objective / self.num_examples as f64
    }

    pub fn accuracy(&self) -> f64 {
        if self.num_examples == 0 {
            return 0.;
        }

        self.correct as f64 / self.num_examples as f64
    }
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#ex {}, objv {:.6}, acc {:.4}",
            self.num_examples,
            self.mean_objective(),
            self.accuracy()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_adds_up() {
        let mut prog = Progress::default();
        prog.merge(&Progress {
            num_examples: 3,
            objective: 1.5,
            correct: 2,
        });
        prog.merge(&Progress {
            num_examples: 1,
            objective: 0.5,
            correct: 1,
        });

        assert_eq!(prog.num_examples, 4);
        assert_eq!(prog.mean_objective(), 0.5);
        assert_eq!(prog.accuracy(), 0.75);
    }

    #[test]
    fn empty_progress_has_zero_rates() {
        let prog = Progress::default();
        assert_eq!(prog.mean_objective(), 0.);
        assert_eq!(prog.accuracy(), 0.);
    }
}
