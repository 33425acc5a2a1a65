use std::ops::Add;

use serde::Serialize;

use crate::stage::Stage;

/// Steps and simulated time summed over the stages where both the step
/// count and the timestep are numeric.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Totals {
    pub steps: i64,
    pub time_ps: f64,
}

impl Add for Totals {
    type Output = Totals;

    fn add(self, rhs: Totals) -> Totals {
        Totals {
            steps: self.steps + rhs.steps,
            time_ps: self.time_ps + rhs.time_ps,
        }
    }
}

/// An ordered sequence of stages. Order is the manifest's (or, for
/// discovery, lexical stem order) and is never re-sorted.
#[derive(Debug, Clone, Default)]
pub struct Protocol {
    pub stages: Vec<Stage>,
}

impl Protocol {
    pub fn new(stages: Vec<Stage>) -> Self {
        Self { stages }
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn totals(&self) -> Totals {
        let mut totals = Totals::default();
        for stage in &self.stages {
            if let (Some(steps), Some(dt)) = (stage.length_steps(), stage.dt_ps()) {
                totals.steps += steps;
                totals.time_ps += steps as f64 * dt;
            }
        }
        totals
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mdmeta_core::ParamValue;
    use mdmeta_core::records::InputDeckRecord;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    fn stage_with_deck(name: &str, nstlim: i64, dt: f64) -> Stage {
        let mut deck = InputDeckRecord::new(PathBuf::from(format!("{name}.mdin")));
        deck.length_steps = Some(ParamValue::Int(nstlim));
        deck.dt = ParamValue::Float(dt);
        let mut stage = Stage::new(name);
        stage.input_deck = Some(deck);
        stage
    }

    #[test]
    fn totals_sum_numeric_stages() {
        let protocol = Protocol::new(vec![
            stage_with_deck("eq", 500_000, 0.002),
            stage_with_deck("prod", 5_000_000, 0.004),
        ]);
        let totals = protocol.totals();
        assert_eq!(totals.steps, 5_500_000);
        assert!((totals.time_ps - 21_000.0).abs() < 1e-9);
    }

    #[test]
    fn totals_skip_placeholder_stages() {
        let mut templated = stage_with_deck("tmpl", 0, 0.002);
        templated.input_deck.as_mut().unwrap().length_steps =
            Some(ParamValue::Text("${NSTEPS}".to_string()));
        let protocol = Protocol::new(vec![templated, stage_with_deck("prod", 1000, 0.002)]);
        let totals = protocol.totals();
        assert_eq!(totals.steps, 1000);
    }

    #[test]
    fn totals_are_additive_over_concatenation() {
        let p1 = Protocol::new(vec![stage_with_deck("a", 100, 0.001)]);
        let p2 = Protocol::new(vec![
            stage_with_deck("b", 200, 0.002),
            stage_with_deck("c", 300, 0.004),
        ]);
        let mut joined = p1.clone();
        joined.stages.extend(p2.stages.clone());
        let sum = p1.totals() + p2.totals();
        assert_eq!(joined.totals().steps, sum.steps);
        assert!((joined.totals().time_ps - sum.time_ps).abs() < 1e-9);
    }
}
