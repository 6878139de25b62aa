// NV7 Controller — Target Classifier
//
// Maps an averaged ladder reading onto a button. Ranges are checked in
// configuration order and the first hit wins, so overlapping bands resolve
// deterministically.

use crate::config::ButtonTargets;
use crate::events::Button;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetRange {
    pub button: Button,
    pub lower: i32,
    pub upper: i32,
}

impl TargetRange {
    pub fn new(button: Button, centre: i32, tolerance: i32) -> Self {
        Self {
            button,
            lower: centre.saturating_sub(tolerance),
            upper: centre.saturating_add(tolerance),
        }
    }

    /// Inclusive on both ends.
    pub fn contains(&self, reading: i32) -> bool {
        reading >= self.lower && reading <= self.upper
    }
}

#[derive(Debug, Clone, Default)]
pub struct Classifier {
    ranges: Vec<TargetRange>,
}

impl Classifier {
    pub fn new(ranges: Vec<TargetRange>) -> Self {
        Self { ranges }
    }

    /// One range per configured centre, keeping the order of `targets`.
    pub fn from_targets(targets: &[ButtonTargets], tolerance: i32) -> Self {
        let ranges = targets
            .iter()
            .flat_map(|t| {
                t.centres
                    .iter()
                    .map(move |&centre| TargetRange::new(t.button, centre, tolerance))
            })
            .collect();
        Self { ranges }
    }

    pub fn ranges(&self) -> &[TargetRange] {
        &self.ranges
    }

    pub fn classify(&self, reading: i32) -> Option<Button> {
        self.ranges
            .iter()
            .find(|r| r.contains(reading))
            .map(|r| r.button)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ladder() -> Classifier {
        Classifier::from_targets(
            &[
                ButtonTargets { button: Button::Channel, centres: vec![200, 950] },
                ButtonTargets { button: Button::Mode, centres: vec![400] },
                ButtonTargets { button: Button::Speed, centres: vec![600] },
            ],
            5,
        )
    }

    #[test]
    fn builds_one_range_per_centre() {
        let c = ladder();
        assert_eq!(c.ranges().len(), 4);
        assert_eq!(c.ranges()[1], TargetRange { button: Button::Channel, lower: 945, upper: 955 });
    }

    #[test]
    fn reading_inside_range_matches() {
        let c = ladder();
        assert_eq!(c.classify(402), Some(Button::Mode));
        assert_eq!(c.classify(951), Some(Button::Channel));
    }

    #[test]
    fn bounds_are_inclusive() {
        let c = ladder();
        assert_eq!(c.classify(595), Some(Button::Speed));
        assert_eq!(c.classify(605), Some(Button::Speed));
        assert_eq!(c.classify(594), None);
        assert_eq!(c.classify(606), None);
    }

    #[test]
    fn reading_outside_all_ranges_is_none() {
        let c = ladder();
        assert_eq!(c.classify(0), None);
        assert_eq!(c.classify(500), None);
        assert_eq!(c.classify(1000), None);
    }

    #[test]
    fn overlapping_ranges_resolve_to_first_configured() {
        let c = Classifier::new(vec![
            TargetRange::new(Button::Colour, 500, 10),
            TargetRange::new(Button::Speed, 505, 10),
        ]);
        assert_eq!(c.classify(508), Some(Button::Colour));
        assert_eq!(c.classify(514), Some(Button::Speed));
    }

    #[test]
    fn empty_classifier_never_matches() {
        assert_eq!(Classifier::default().classify(200), None);
    }
}
