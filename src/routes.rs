//! Canonical entry routes per stage and the historical aliases that still
//! resolve to the same stage.

use crate::types::Step;

/// Where a user without a diagnosis summary is sent.
pub const DIAGNOSIS_ROUTE: &str = "/diagnosis";

const ALIASES: &[(&str, Step)] = &[
    ("/naming", Step::Naming),
    ("/nameconsulting", Step::Naming),
    ("/brand/naming", Step::Naming),
    ("/concept", Step::Concept),
    ("/homepage", Step::Concept),
    ("/brand/homepage/interview", Step::Concept),
    ("/brand/concept", Step::Concept),
    ("/story", Step::Story),
    ("/brandstory", Step::Story),
    ("/brand/story/interview", Step::Story),
    ("/logo", Step::Logo),
    ("/logoconsulting", Step::Logo),
    ("/brand/logo", Step::Logo),
];

/// The one canonical entry route for `step`.
pub fn step_route(step: Step) -> &'static str {
    match step {
        Step::Naming => "/brand/naming/interview",
        Step::Concept => "/brand/concept/interview",
        Step::Story => "/brand/story",
        Step::Logo => "/brand/logo/interview",
    }
}

/// Resolves a path (canonical or alias) to its stage. Query strings,
/// fragments, trailing slashes, and letter case are ignored.
pub fn step_for_route(path: &str) -> Option<Step> {
    let normalized = normalize(path);
    Step::ALL
        .into_iter()
        .find(|step| step_route(*step) == normalized)
        .or_else(|| {
            ALIASES
                .iter()
                .find(|(alias, _)| *alias == normalized)
                .map(|(_, step)| *step)
        })
}

pub fn is_flow_route(path: &str) -> bool {
    step_for_route(path).is_some()
}

fn normalize(path: &str) -> String {
    let end = path.find(['?', '#']).unwrap_or(path.len());
    let trimmed = path[..end].trim().trim_end_matches('/');
    let lowered = trimmed.to_lowercase();
    if lowered.starts_with('/') {
        lowered
    } else {
        format!("/{}", lowered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_canonical_route_resolves_to_its_step() {
        for step in Step::ALL {
            assert_eq!(step_for_route(step_route(step)), Some(step));
        }
    }

    #[test]
    fn aliases_resolve_and_normalize() {
        assert_eq!(step_for_route("/homepage/"), Some(Step::Concept));
        assert_eq!(step_for_route("/BrandStory?x=1"), Some(Step::Story));
        assert_eq!(step_for_route("logo#top"), Some(Step::Logo));
        assert!(!is_flow_route("/diagnosis"));
        assert!(!is_flow_route("/mypage/reports"));
    }
}
