use crate::model::{Assignment, AssignmentGroup, Id};
use serde::Serialize;

pub const PENDING_REVIEW: &str = "pending_review";
pub const DEFAULT_ROUNDING_PLACES: u32 = 2;

/// How an assignment participates in a grade calculation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScoreState {
    /// No usable grade: contributes nothing earned.
    Ungraded,
    /// Graded but still awaiting review; counts only outside graded-only mode.
    PendingReview(f64),
    Graded(f64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct GradePolicy {
    pub weighted: bool,
    pub graded_only: bool,
    pub rounding_places: u32,
    pub pending_review_state: String,
}

impl GradePolicy {
    pub fn new(weighted: bool, graded_only: bool) -> Self {
        Self {
            weighted,
            graded_only,
            rounding_places: DEFAULT_ROUNDING_PLACES,
            pending_review_state: PENDING_REVIEW.to_string(),
        }
    }

    fn counts(&self, state: ScoreState) -> Option<f64> {
        match state {
            ScoreState::Ungraded => None,
            ScoreState::PendingReview(_) if self.graded_only => None,
            ScoreState::PendingReview(v) | ScoreState::Graded(v) => Some(v),
        }
    }
}

pub fn score_state(assignment: &Assignment, pending_review_state: &str) -> ScoreState {
    let Some(sub) = assignment.submission.as_ref() else {
        return ScoreState::Ungraded;
    };
    if sub.grade.is_none() || assignment.submission_types.iter().any(|t| t.is_none()) {
        return ScoreState::Ungraded;
    }
    let score = sub.score.unwrap_or(0.0);
    if sub.workflow_state.as_deref() == Some(pending_review_state) {
        ScoreState::PendingReview(score)
    } else {
        ScoreState::Graded(score)
    }
}

/// Half-up rounding on the shortest decimal representation of `x`,
/// so `85.555` rounds to `85.56` even though its binary value sits just below.
pub fn round_half_up(x: f64, places: u32) -> f64 {
    if !x.is_finite() {
        return x;
    }
    let repr = format!("{}", x.abs());
    let (int_part, frac_part) = repr.split_once('.').unwrap_or((repr.as_str(), ""));
    let places = places as usize;
    if frac_part.len() <= places {
        return x;
    }

    let mut digits: Vec<u8> = int_part
        .bytes()
        .chain(frac_part.bytes().take(places))
        .map(|b| b - b'0')
        .collect();
    let mut int_len = int_part.len();

    if frac_part.as_bytes()[places] >= b'5' {
        let mut i = digits.len();
        loop {
            if i == 0 {
                digits.insert(0, 1);
                int_len += 1;
                break;
            }
            i -= 1;
            if digits[i] == 9 {
                digits[i] = 0;
            } else {
                digits[i] += 1;
                break;
            }
        }
    }

    let mut out = String::with_capacity(digits.len() + 2);
    for (i, d) in digits.iter().enumerate() {
        if i == int_len {
            out.push('.');
        }
        out.push((b'0' + d) as char);
    }
    let magnitude: f64 = out.parse().unwrap_or(0.0);
    if x.is_sign_negative() {
        -magnitude
    } else {
        magnitude
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Totals {
    earned: f64,
    possible: f64,
    counted: usize,
}

impl Totals {
    fn ratio(&self) -> f64 {
        if self.possible > 0.0 && self.earned > 0.0 {
            self.earned / self.possible
        } else {
            0.0
        }
    }
}

fn group_totals(group: &AssignmentGroup, policy: &GradePolicy) -> Totals {
    let mut t = Totals::default();
    for a in &group.assignments {
        let counted = policy.counts(score_state(a, &policy.pending_review_state));
        if let Some(score) = counted {
            t.earned += score;
            t.counted += 1;
        }
        // Graded-only restricts the denominator too; otherwise ungraded work counts as possible points.
        if counted.is_some() || !policy.graded_only {
            t.possible += a.points_possible;
        }
    }
    t
}

/// Course percentage for one of the four weighted/graded-only combinations.
pub fn compute_grade_with(groups: &[AssignmentGroup], policy: &GradePolicy) -> f64 {
    let raw = if policy.weighted {
        let mut total = 0.0_f64;
        let mut total_weight = 0.0_f64;
        for g in groups {
            let t = group_totals(g, policy);
            if policy.graded_only && t.counted > 0 {
                total_weight += g.group_weight;
            }
            total += t.ratio() * g.group_weight;
        }
        if policy.graded_only {
            if total_weight <= 0.0 {
                0.0
            } else if total_weight < 100.0 {
                total * 100.0 / total_weight
            } else {
                total
            }
        } else {
            total
        }
    } else {
        let mut all = Totals::default();
        for g in groups {
            let t = group_totals(g, policy);
            all.earned += t.earned;
            all.possible += t.possible;
            all.counted += t.counted;
        }
        all.ratio() * 100.0
    };

    round_half_up(raw.max(0.0), policy.rounding_places)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupTotal {
    pub group_id: Id,
    pub name: String,
    pub weight: f64,
    pub earned: f64,
    pub possible: f64,
    pub counted_count: usize,
    pub percent: Option<f64>,
}

pub fn group_breakdown(groups: &[AssignmentGroup], policy: &GradePolicy) -> Vec<GroupTotal> {
    let mut out: Vec<GroupTotal> = groups
        .iter()
        .map(|g| {
            let t = group_totals(g, policy);
            GroupTotal {
                group_id: g.id,
                name: g.name.clone(),
                weight: g.group_weight,
                earned: t.earned,
                possible: t.possible,
                counted_count: t.counted,
                percent: if t.possible > 0.0 {
                    Some(round_half_up(
                        100.0 * t.earned / t.possible,
                        policy.rounding_places,
                    ))
                } else {
                    None
                },
            }
        })
        .collect();
    out.sort_by_key(|g| {
        groups
            .iter()
            .find(|x| x.id == g.group_id)
            .map(|x| x.position)
            .unwrap_or(i64::MAX)
    });
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Submission;

    fn compute_grade(groups: &[AssignmentGroup], weighted: bool, graded_only: bool) -> f64 {
        compute_grade_with(groups, &GradePolicy::new(weighted, graded_only))
    }

    fn graded(id: Id, points: f64, score: f64) -> Assignment {
        Assignment {
            id,
            name: format!("A{id}"),
            points_possible: points,
            submission_types: vec![Some("online_text_entry".into())],
            submission: Some(Submission {
                assignment_id: Some(id),
                score: Some(score),
                grade: Some(score.to_string()),
                workflow_state: Some("graded".into()),
            }),
        }
    }

    fn ungraded(id: Id, points: f64) -> Assignment {
        Assignment {
            id,
            name: format!("A{id}"),
            points_possible: points,
            submission_types: vec![Some("online_upload".into())],
            submission: None,
        }
    }

    fn group(id: Id, weight: f64, assignments: Vec<Assignment>) -> AssignmentGroup {
        AssignmentGroup {
            id,
            name: format!("G{id}"),
            position: id,
            group_weight: weight,
            assignments,
        }
    }

    const COMBOS: [(bool, bool); 4] = [(false, false), (false, true), (true, false), (true, true)];

    #[test]
    fn round_half_up_uses_decimal_digits() {
        assert_eq!(round_half_up(85.555, 2), 85.56);
        assert_eq!(round_half_up(66.666666, 2), 66.67);
        assert_eq!(round_half_up(80.0, 2), 80.0);
        assert_eq!(round_half_up(99.995, 2), 100.0);
        assert_eq!(round_half_up(0.004, 2), 0.0);
        assert_eq!(round_half_up(-1.005, 2), -1.01);
    }

    #[test]
    fn unweighted_all_assignments_ratio() {
        let groups = vec![group(1, 0.0, vec![graded(1, 10.0, 5.0), graded(2, 20.0, 15.0)])];
        assert_eq!(compute_grade(&groups, false, false), 66.67);
    }

    #[test]
    fn unweighted_all_counts_ungraded_as_possible() {
        let groups = vec![group(1, 0.0, vec![graded(1, 10.0, 10.0), ungraded(2, 10.0)])];
        assert_eq!(compute_grade(&groups, false, false), 50.0);
        assert_eq!(compute_grade(&groups, false, true), 100.0);
    }

    #[test]
    fn zero_possible_points_never_nan() {
        let groups = vec![group(1, 100.0, vec![graded(1, 0.0, 0.0), graded(2, 0.0, 3.0)])];
        for (weighted, graded_only) in COMBOS {
            let v = compute_grade(&groups, weighted, graded_only);
            assert!(v.is_finite());
            assert_eq!(v, 0.0, "weighted={weighted} graded_only={graded_only}");
        }
    }

    #[test]
    fn zero_possible_group_contributes_nothing_weighted() {
        let groups = vec![
            group(1, 50.0, vec![graded(1, 0.0, 4.0)]),
            group(2, 50.0, vec![graded(2, 10.0, 10.0)]),
        ];
        assert_eq!(compute_grade(&groups, true, false), 50.0);
    }

    #[test]
    fn weighted_graded_only_normalizes_missing_groups() {
        let groups = vec![
            group(1, 50.0, vec![graded(1, 10.0, 8.0)]),
            group(2, 50.0, vec![ungraded(2, 10.0)]),
        ];
        assert_eq!(compute_grade(&groups, true, true), 80.0);
        assert_eq!(compute_grade(&groups, true, false), 40.0);
    }

    #[test]
    fn weighted_graded_only_counts_zero_scores_toward_weight() {
        let groups = vec![
            group(1, 50.0, vec![graded(1, 10.0, 8.0)]),
            group(2, 50.0, vec![graded(2, 10.0, 0.0)]),
        ];
        assert_eq!(compute_grade(&groups, true, true), 40.0);
    }

    #[test]
    fn pending_review_excluded_only_in_graded_only_mode() {
        let mut pending = graded(2, 10.0, 10.0);
        if let Some(s) = pending.submission.as_mut() {
            s.workflow_state = Some(PENDING_REVIEW.into());
        }
        let groups = vec![group(1, 0.0, vec![graded(1, 10.0, 5.0), pending])];
        assert_eq!(compute_grade(&groups, false, false), 75.0);
        assert_eq!(compute_grade(&groups, false, true), 50.0);
    }

    #[test]
    fn null_submission_type_never_counts() {
        let mut a = graded(1, 10.0, 10.0);
        a.submission_types.push(None);
        let groups = vec![group(1, 0.0, vec![a, graded(2, 10.0, 5.0)])];
        assert_eq!(compute_grade(&groups, false, true), 50.0);
    }

    #[test]
    fn missing_grade_string_is_ungraded() {
        let mut a = graded(1, 10.0, 10.0);
        if let Some(s) = a.submission.as_mut() {
            s.grade = None;
        }
        assert_eq!(score_state(&a, PENDING_REVIEW), ScoreState::Ungraded);
    }

    #[test]
    fn extra_credit_can_exceed_one_hundred() {
        let groups = vec![group(1, 0.0, vec![graded(1, 10.0, 12.0)])];
        assert_eq!(compute_grade(&groups, false, false), 120.0);
    }

    #[test]
    fn compute_is_idempotent() {
        let groups = vec![
            group(1, 30.0, vec![graded(1, 7.0, 3.0), ungraded(2, 4.0)]),
            group(2, 70.0, vec![graded(3, 9.0, 8.5)]),
        ];
        for (weighted, graded_only) in COMBOS {
            let a = compute_grade(&groups, weighted, graded_only);
            let b = compute_grade(&groups, weighted, graded_only);
            assert_eq!(a.to_bits(), b.to_bits());
        }
    }

    #[test]
    fn breakdown_reports_per_group_percent() {
        let groups = vec![
            group(2, 40.0, vec![ungraded(3, 10.0)]),
            group(1, 60.0, vec![graded(1, 10.0, 5.0), graded(2, 20.0, 15.0)]),
        ];
        let rows = group_breakdown(&groups, &GradePolicy::new(true, true));
        assert_eq!(rows[0].group_id, 1);
        assert_eq!(rows[0].percent, Some(66.67));
        assert_eq!(rows[1].percent, None);
        assert_eq!(rows[1].counted_count, 0);
    }
}
