use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::ser::SerializeStruct;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// Current wall-clock time in epoch milliseconds.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

// --- Enums ---

/// One of the four consulting stages. Variant order is stage order.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    #[default]
    Naming,
    Concept,
    Story,
    Logo,
}

impl Step {
    pub const ALL: [Step; 4] = [Step::Naming, Step::Concept, Step::Story, Step::Logo];

    pub fn as_str(&self) -> &'static str {
        match self {
            Step::Naming => "naming",
            Step::Concept => "concept",
            Step::Story => "story",
            Step::Logo => "logo",
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn previous(self) -> Option<Step> {
        self.index().checked_sub(1).map(|i| Step::ALL[i])
    }

    pub fn next(self) -> Option<Step> {
        Step::ALL.get(self.index() + 1).copied()
    }

    /// This stage followed by every stage after it.
    pub fn and_downstream(self) -> &'static [Step] {
        &Step::ALL[self.index()..]
    }

    /// Every stage strictly before this one, in order.
    pub fn upstream(self) -> &'static [Step] {
        &Step::ALL[..self.index()]
    }

    /// Parses a stage name, falling back to `Naming` for anything unknown.
    pub fn parse_lossy(s: &str) -> Step {
        parse_step(s).unwrap_or_default()
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Step {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_step(s)
    }
}

pub fn parse_step(s: &str) -> Result<Step, String> {
    match s.trim().to_lowercase().as_str() {
        "naming" => Ok(Step::Naming),
        "concept" => Ok(Step::Concept),
        "story" => Ok(Step::Story),
        "logo" => Ok(Step::Logo),
        _ => Err(format!(
            "Invalid step '{}': expected naming, concept, story, or logo",
            s
        )),
    }
}

/// Why a stage may not be viewed right now.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    DiagnosisMissing,
    NamingMissing,
    ConceptMissing,
    StoryMissing,
    NoBack,
}

impl DenyReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DenyReason::DiagnosisMissing => "diagnosis_missing",
            DenyReason::NamingMissing => "naming_missing",
            DenyReason::ConceptMissing => "concept_missing",
            DenyReason::StoryMissing => "story_missing",
            DenyReason::NoBack => "no_back",
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of an access check. A redirect is an expected outcome, not an error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StepAccess {
    Granted,
    Redirect {
        redirect_to: String,
        reason: DenyReason,
        current_step: Option<Step>,
    },
}

impl StepAccess {
    pub fn is_ok(&self) -> bool {
        matches!(self, StepAccess::Granted)
    }

    pub fn reason(&self) -> Option<DenyReason> {
        match self {
            StepAccess::Granted => None,
            StepAccess::Redirect { reason, .. } => Some(*reason),
        }
    }

    pub fn redirect_to(&self) -> Option<&str> {
        match self {
            StepAccess::Granted => None,
            StepAccess::Redirect { redirect_to, .. } => Some(redirect_to),
        }
    }
}

/// Serializes as `{ok, redirectTo?, reason?, currentStep?}`.
impl Serialize for StepAccess {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            StepAccess::Granted => {
                let mut s = serializer.serialize_struct("StepAccess", 1)?;
                s.serialize_field("ok", &true)?;
                s.end()
            }
            StepAccess::Redirect {
                redirect_to,
                reason,
                current_step,
            } => {
                let len = if current_step.is_some() { 4 } else { 3 };
                let mut s = serializer.serialize_struct("StepAccess", len)?;
                s.serialize_field("ok", &false)?;
                s.serialize_field("redirectTo", redirect_to)?;
                s.serialize_field("reason", reason)?;
                if let Some(step) = current_step {
                    s.serialize_field("currentStep", step)?;
                }
                s.end()
            }
        }
    }
}

/// External brand identifier. Older records store it as a number, newer ones
/// as a string.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(untagged)]
pub enum BrandId {
    Number(i64),
    Text(String),
}

impl fmt::Display for BrandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BrandId::Number(n) => write!(f, "{}", n),
            BrandId::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for BrandId {
    fn from(n: i64) -> Self {
        BrandId::Number(n)
    }
}

impl From<&str> for BrandId {
    fn from(s: &str) -> Self {
        match s.trim().parse::<i64>() {
            Ok(n) => BrandId::Number(n),
            Err(_) => BrandId::Text(s.to_string()),
        }
    }
}

// --- Structs ---

/// A generated proposal. Only `id` is meaningful here; everything else is
/// carried through untouched for the stage UI.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub struct Candidate {
    #[serde(default, deserialize_with = "deserialize_id")]
    pub id: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

const DISPLAY_NAME_FIELDS: &[&str] = &["name", "title", "label", "headline"];

impl Candidate {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            fields: Map::new(),
        }
    }

    pub fn with_field(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    /// First non-blank of `name`, `title`, `label`, `headline`.
    pub fn display_name(&self) -> Option<&str> {
        DISPLAY_NAME_FIELDS.iter().find_map(|key| {
            self.fields
                .get(*key)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
        })
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct StepResult {
    #[serde(
        default,
        deserialize_with = "deserialize_candidates",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub candidates: Vec<Candidate>,
    #[serde(
        default,
        deserialize_with = "deserialize_optional_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub selected_id: Option<String>,
    #[serde(
        default,
        deserialize_with = "deserialize_lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub selected: Option<Candidate>,
    #[serde(
        default,
        deserialize_with = "deserialize_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub updated_at: Option<i64>,
}

impl StepResult {
    /// True when either a selected id or a denormalized selection is recorded.
    pub fn has_selection(&self) -> bool {
        self.selected_id.as_deref().is_some_and(|id| !id.is_empty()) || self.selected.is_some()
    }

    /// The chosen candidate. The denormalized `selected` copy wins over
    /// resolving `selected_id` against `candidates`.
    pub fn selected_candidate(&self) -> Option<&Candidate> {
        if let Some(ref selected) = self.selected {
            return Some(selected);
        }
        let id = self.selected_id.as_deref()?;
        self.candidates.iter().find(|c| c.id == id)
    }

    /// Identifier of the selection, preferring the denormalized copy's id.
    pub fn selected_identifier(&self) -> Option<&str> {
        self.selected
            .as_ref()
            .map(|c| c.id.as_str())
            .filter(|id| !id.is_empty())
            .or_else(|| self.selected_id.as_deref().filter(|id| !id.is_empty()))
    }
}

/// Seed data produced by the diagnosis interview.
///
/// Only string values populate the typed fields. Anything else, such as a
/// structured `targetPersona`, stays in `extra` and is written back as found.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(rename_all = "camelCase", from = "Value")]
pub struct DiagnosisSummary {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub one_line: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_persona: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub industry: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vision_headline: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub short_text: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Moves `key` out of `map` when it holds a string (or `null`); leaves any
/// other value in place.
fn take_text(map: &mut Map<String, Value>, key: &str) -> Option<String> {
    match map.get(key) {
        Some(Value::String(_)) | Some(Value::Null) => match map.remove(key) {
            Some(Value::String(text)) => Some(text),
            _ => None,
        },
        _ => None,
    }
}

impl From<Value> for DiagnosisSummary {
    fn from(raw: Value) -> Self {
        let Value::Object(mut extra) = raw else {
            return DiagnosisSummary::default();
        };
        DiagnosisSummary {
            company_name: take_text(&mut extra, "companyName"),
            one_line: take_text(&mut extra, "oneLine"),
            target_persona: take_text(&mut extra, "targetPersona"),
            industry: take_text(&mut extra, "industry"),
            stage: take_text(&mut extra, "stage"),
            website: take_text(&mut extra, "website"),
            vision_headline: take_text(&mut extra, "visionHeadline"),
            short_text: take_text(&mut extra, "shortText"),
            extra,
        }
    }
}

/// Maximum number of fragments joined into a summary's short text.
pub const SHORT_TEXT_FRAGMENTS: usize = 4;

impl DiagnosisSummary {
    /// A summary counts only with a company name or a one-line pitch.
    pub fn is_present(&self) -> bool {
        non_blank(self.company_name.as_deref()).is_some()
            || non_blank(self.one_line.as_deref()).is_some()
    }

    /// Up to four non-empty fragments joined with " · ".
    pub fn compose_short_text(&self) -> Option<String> {
        let fragments: Vec<&str> = [
            self.company_name.as_deref(),
            self.industry.as_deref(),
            self.stage.as_deref(),
            self.one_line.as_deref(),
            self.target_persona.as_deref(),
            self.vision_headline.as_deref(),
        ]
        .into_iter()
        .filter_map(non_blank)
        .take(SHORT_TEXT_FRAGMENTS)
        .collect();

        if fragments.is_empty() {
            None
        } else {
            Some(fragments.join(" · "))
        }
    }

    /// Stored short text, or one composed from the summary fields.
    pub fn effective_short_text(&self) -> Option<String> {
        non_blank(self.short_text.as_deref())
            .map(str::to_string)
            .or_else(|| self.compose_short_text())
    }
}

/// State of an active, strictly ordered run.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct FlowState {
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub active: bool,
    #[serde(default, deserialize_with = "deserialize_step_lossy")]
    pub current_step: Step,
    #[serde(default, deserialize_with = "deserialize_timestamp_or_zero")]
    pub started_at: i64,
    #[serde(default, deserialize_with = "deserialize_timestamp_or_zero")]
    pub updated_at: i64,
    #[serde(
        default,
        deserialize_with = "deserialize_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub completed_at: Option<i64>,
    #[serde(
        default,
        deserialize_with = "deserialize_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub aborted_at: Option<i64>,
    #[serde(
        default,
        deserialize_with = "deserialize_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub abort_reason: Option<String>,
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub pending_abort: bool,
    #[serde(
        default,
        deserialize_with = "deserialize_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub pending_reason: Option<String>,
}

/// Coarse lifecycle position derived from a `FlowState`.
#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(tag = "state", content = "step", rename_all = "snake_case")]
pub enum FlowPhase {
    Inactive,
    Running(Step),
    Completed,
    Aborted,
}

/// The root persisted record, one per user scope.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Pipeline {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnosis_summary: Option<DiagnosisSummary>,
    #[serde(
        default,
        deserialize_with = "deserialize_lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub naming: Option<StepResult>,
    #[serde(
        default,
        deserialize_with = "deserialize_lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub concept: Option<StepResult>,
    #[serde(
        default,
        deserialize_with = "deserialize_lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub story: Option<StepResult>,
    #[serde(
        default,
        deserialize_with = "deserialize_lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub logo: Option<StepResult>,
    #[serde(
        default,
        deserialize_with = "deserialize_lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub brand_id: Option<BrandId>,
    #[serde(
        default,
        deserialize_with = "deserialize_lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub brand_flow: Option<FlowState>,
    #[serde(
        default,
        deserialize_with = "deserialize_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub updated_at: Option<i64>,
    /// Fields written by other surfaces; preserved across rewrites.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Pipeline {
    pub fn step(&self, step: Step) -> Option<&StepResult> {
        self.slot(step).as_ref()
    }

    pub fn set_step(&mut self, step: Step, result: Option<StepResult>) {
        *self.slot_mut(step) = result;
    }

    pub fn take_step(&mut self, step: Step) -> Option<StepResult> {
        self.slot_mut(step).take()
    }

    pub fn selected(&self, step: Step) -> Option<&Candidate> {
        self.step(step).and_then(StepResult::selected_candidate)
    }

    pub fn has_diagnosis(&self) -> bool {
        self.diagnosis_summary
            .as_ref()
            .is_some_and(DiagnosisSummary::is_present)
    }

    fn slot(&self, step: Step) -> &Option<StepResult> {
        match step {
            Step::Naming => &self.naming,
            Step::Concept => &self.concept,
            Step::Story => &self.story,
            Step::Logo => &self.logo,
        }
    }

    fn slot_mut(&mut self, step: Step) -> &mut Option<StepResult> {
        match step {
            Step::Naming => &mut self.naming,
            Step::Concept => &mut self.concept,
            Step::Story => &mut self.story,
            Step::Logo => &mut self.logo,
        }
    }
}

/// Shallow patch applied by `PipelineStore::write`. `None` leaves a field as is.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PipelinePatch {
    pub diagnosis_summary: Option<DiagnosisSummary>,
    pub naming: Option<StepResult>,
    pub concept: Option<StepResult>,
    pub story: Option<StepResult>,
    pub logo: Option<StepResult>,
    pub brand_id: Option<BrandId>,
    pub brand_flow: Option<FlowState>,
}

impl PipelinePatch {
    pub fn step(step: Step, result: StepResult) -> Self {
        let mut patch = PipelinePatch::default();
        match step {
            Step::Naming => patch.naming = Some(result),
            Step::Concept => patch.concept = Some(result),
            Step::Story => patch.story = Some(result),
            Step::Logo => patch.logo = Some(result),
        }
        patch
    }

    pub fn flow(state: FlowState) -> Self {
        PipelinePatch {
            brand_flow: Some(state),
            ..Default::default()
        }
    }

    pub fn apply_to(self, pipeline: &mut Pipeline) {
        if self.diagnosis_summary.is_some() {
            pipeline.diagnosis_summary = self.diagnosis_summary;
        }
        for (step, value) in [
            (Step::Naming, self.naming),
            (Step::Concept, self.concept),
            (Step::Story, self.story),
            (Step::Logo, self.logo),
        ] {
            if value.is_some() {
                pipeline.set_step(step, value);
            }
        }
        if self.brand_id.is_some() {
            pipeline.brand_id = self.brand_id;
        }
        if self.brand_flow.is_some() {
            pipeline.brand_flow = self.brand_flow;
        }
    }
}

/// Immutable "my reports" entry derived from a completed pipeline.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub subtitle: String,
    /// Deduplication key; never displayed.
    pub signature: String,
    pub created_at: i64,
    #[serde(rename = "createdISO")]
    pub created_iso: String,
    #[serde(default)]
    pub short_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand_id: Option<BrandId>,
    #[serde(default)]
    pub selections: BTreeMap<Step, Candidate>,
}

// --- Lenient field decoding for records written by older code ---

pub(crate) fn non_blank(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

fn id_from_value(value: Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(id_from_value(Value::deserialize(deserializer)?).unwrap_or_default())
}

fn deserialize_optional_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(id_from_value(Value::deserialize(deserializer)?).filter(|id| !id.is_empty()))
}

/// Accepts `null` and skips entries that are not objects.
fn deserialize_candidates<'de, D>(deserializer: D) -> Result<Vec<Candidate>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Value::deserialize(deserializer)?;
    let Value::Array(items) = raw else {
        return Ok(Vec::new());
    };
    Ok(items
        .into_iter()
        .filter(Value::is_object)
        .filter_map(|item| serde_json::from_value(item).ok())
        .collect())
}

/// Accepts epoch milliseconds as an integer, a float, a numeric string, or an
/// RFC 3339 string. Anything else decodes as absent.
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(parse_timestamp(&Value::deserialize(deserializer)?))
}

pub fn parse_timestamp(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>().ok().or_else(|| {
                chrono::DateTime::parse_from_rfc3339(s)
                    .ok()
                    .map(|dt| dt.timestamp_millis())
            })
        }
        _ => None,
    }
}

fn deserialize_timestamp_or_zero<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(parse_timestamp(&Value::deserialize(deserializer)?).unwrap_or_default())
}

/// `true` only for a JSON `true`; `null` and other types read as `false`.
fn deserialize_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Value::deserialize(deserializer)?.as_bool().unwrap_or(false))
}

fn deserialize_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(text) => Ok(Some(text)),
        _ => Ok(None),
    }
}

/// Decodes a nested record, reading a value of the wrong shape as absent so
/// one bad sub-record never fails the record around it.
fn deserialize_lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    Ok(serde_json::from_value(Value::deserialize(deserializer)?).ok())
}

fn deserialize_step_lossy<'de, D>(deserializer: D) -> Result<Step, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Value::deserialize(deserializer)?;
    Ok(raw.as_str().map(Step::parse_lossy).unwrap_or_default())
}
