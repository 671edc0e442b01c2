//! Maps the step-specific payloads returned by the analysis backend onto one display model.
//!
//! Each step has its own payload decoder. Decoders are lenient at the field level: a missing or
//! oddly typed sub-field is treated as absent and never fails the decode, and a list entry that
//! does not fit is skipped on its own without dropping its neighbours. Only a missing
//! top-level payload, or a required list that is not a list, yields an empty result.
//!
//! | Step       | Payload field                          | Entries                           |
//! |------------|----------------------------------------|-----------------------------------|
//! | symptom    | `top_differentials`, `risk_level`      | `name: rationale (ICD: code)`     |
//! | literature | `articles` or `articles.summaries`     | title or 60-char summary + PMID   |
//! | case       | `matched_cases`                        | name/id, description/outcome, score |
//! | treatment  | `treatments` split on `type`           | drug and non-drug options         |
//! | summary    | summaries, `recommendations`, `risk_level` | findings and recommendations  |

use serde::de::{DeserializeOwned, Deserializer, IgnoredAny};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::pipeline::StepId;

/// Maximum number of characters of a literature summary used as its heading
pub const SUMMARY_HEADING_CHARS: usize = 60;

/// One displayable line of a step result
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Finding {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pmid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

impl Finding {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Section {
    pub title: &'static str,
    pub findings: Vec<Finding>,
}

/// Step-level scalar shown next to the findings
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Metric {
    RiskLevel(String),
    /// Best match score among the matched cases
    MatchScore(f64),
    RiskAssessment(String),
}

/// Canonical, shape-independent view of one step's result
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedResult {
    pub step: StepId,
    pub title: &'static str,
    pub sections: Vec<Section>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metric: Option<Metric>,
}

impl NormalizedResult {
    fn new(step: StepId, sections: Vec<Section>, metric: Option<Metric>) -> Self {
        Self {
            step,
            title: step.result_title(),
            sections,
            metric,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.metric.is_none() && self.sections.iter().all(|s| s.findings.is_empty())
    }

    pub fn section(&self, title: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.title == title)
    }
}

/// Normalize the payload of `step`.
pub fn normalize(step: StepId, payload: Option<&Value>) -> NormalizedResult {
    match step {
        StepId::Symptom => normalize_symptom(payload),
        StepId::Literature => normalize_literature(payload),
        StepId::Case => normalize_case(payload),
        StepId::Treatment => normalize_treatment(payload),
        StepId::Summary => normalize_summary(payload),
    }
}

// ---------------------------------------------------------------------------
// Lenient field decoding
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Text(String),
    Number(serde_json::Number),
    Flag(bool),
    Other(IgnoredAny),
}

/// Any scalar as text; blank strings, containers and null are absent.
fn text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let scalar = Option::<Scalar>::deserialize(deserializer)?;
    Ok(match scalar {
        Some(Scalar::Text(s)) if !s.trim().is_empty() => Some(s),
        Some(Scalar::Number(n)) => Some(n.to_string()),
        Some(Scalar::Flag(b)) => Some(b.to_string()),
        _ => None,
    })
}

/// A number, or a string holding one.
fn number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let scalar = Option::<Scalar>::deserialize(deserializer)?;
    Ok(match scalar {
        Some(Scalar::Number(n)) => n.as_f64(),
        Some(Scalar::Text(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

/// Decode a nested value, treating a shape mismatch as absent.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(T::deserialize(&value).ok())
}

/// Decode a list element by element, dropping entries that don't fit `T`.
fn items<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let items = Vec::<Value>::deserialize(deserializer)?;
    Ok(items
        .iter()
        // Nested arrays would otherwise fill struct fields positionally
        .filter(|item| !item.is_array())
        .filter_map(|item| T::deserialize(item).ok())
        .collect())
}

/// Like [`items`], treating a value that is not a list as absent.
fn lenient_items<'de, D, T>(deserializer: D) -> Result<Option<Vec<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(items(&value).ok())
}

fn decode<T: DeserializeOwned>(step: StepId, payload: Option<&Value>) -> Option<T> {
    let payload = payload?;
    if !payload.is_object() {
        debug!(step = %step, "Payload is not an object");
        return None;
    }
    match T::deserialize(payload) {
        Ok(decoded) => Some(decoded),
        Err(e) => {
            debug!(step = %step, error = %e, "Payload did not match the expected shape");
            None
        }
    }
}

/// Rounds to two decimal places.
fn round_score(score: f64) -> f64 {
    (score * 100.0).round() / 100.0
}

// ---------------------------------------------------------------------------
// symptom
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct SymptomPayload {
    #[serde(default, deserialize_with = "lenient_items")]
    top_differentials: Option<Vec<Differential>>,
    #[serde(default, deserialize_with = "text")]
    risk_level: Option<String>,
}

#[derive(Deserialize)]
struct Differential {
    #[serde(default, deserialize_with = "text")]
    name: Option<String>,
    #[serde(default, deserialize_with = "text")]
    rationale: Option<String>,
    #[serde(default, deserialize_with = "text")]
    icd10cm_code: Option<String>,
}

impl Differential {
    fn line(self) -> String {
        let mut line = self.name.unwrap_or_default();
        if let Some(rationale) = self.rationale {
            if !line.is_empty() {
                line.push_str(": ");
            }
            line.push_str(&rationale);
        }
        if let Some(code) = self.icd10cm_code {
            if !line.is_empty() {
                line.push(' ');
            }
            line.push_str(&format!("(ICD: {})", code));
        }
        line
    }
}

pub fn normalize_symptom(payload: Option<&Value>) -> NormalizedResult {
    let decoded: Option<SymptomPayload> = decode(StepId::Symptom, payload);

    let (findings, metric) = match decoded {
        Some(p) => (
            p.top_differentials
                .unwrap_or_default()
                .into_iter()
                .map(|d| Finding::new(d.line()))
                .collect(),
            p.risk_level.map(Metric::RiskLevel),
        ),
        None => (Vec::new(), None),
    };

    NormalizedResult::new(
        StepId::Symptom,
        vec![Section {
            title: "Key Findings",
            findings,
        }],
        metric,
    )
}

// ---------------------------------------------------------------------------
// literature
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct LiteraturePayload {
    #[serde(default, deserialize_with = "lenient")]
    articles: Option<ArticleSet>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ArticleSet {
    Summarized {
        #[serde(deserialize_with = "items")]
        summaries: Vec<Article>,
    },
    Listed(#[serde(deserialize_with = "items")] Vec<Article>),
}

#[derive(Deserialize)]
struct Article {
    #[serde(default, deserialize_with = "text")]
    title: Option<String>,
    #[serde(default, deserialize_with = "text")]
    summary: Option<String>,
    #[serde(default, deserialize_with = "text")]
    pmid: Option<String>,
}

impl Article {
    fn finding(self) -> Finding {
        let text = match (self.title, self.summary) {
            (Some(title), _) => title,
            (None, Some(summary)) => summary.chars().take(SUMMARY_HEADING_CHARS).collect(),
            (None, None) => String::new(),
        };
        Finding {
            pmid: self.pmid,
            ..Finding::new(text)
        }
    }
}

pub fn normalize_literature(payload: Option<&Value>) -> NormalizedResult {
    let articles = decode::<LiteraturePayload>(StepId::Literature, payload)
        .and_then(|p| p.articles)
        .map(|set| match set {
            ArticleSet::Summarized { summaries } => summaries,
            ArticleSet::Listed(articles) => articles,
        })
        .unwrap_or_default();

    NormalizedResult::new(
        StepId::Literature,
        vec![Section {
            title: "Relevant References",
            findings: articles.into_iter().map(Article::finding).collect(),
        }],
        None,
    )
}

// ---------------------------------------------------------------------------
// case
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct CasePayload {
    #[serde(default, deserialize_with = "lenient_items")]
    matched_cases: Option<Vec<MatchedCase>>,
}

#[derive(Deserialize)]
struct MatchedCase {
    #[serde(default, deserialize_with = "text")]
    name: Option<String>,
    #[serde(default, rename = "caseId", deserialize_with = "text")]
    case_id: Option<String>,
    #[serde(default, deserialize_with = "number")]
    match_score: Option<f64>,
    #[serde(default, deserialize_with = "number")]
    similarity: Option<f64>,
    #[serde(default, deserialize_with = "text")]
    description: Option<String>,
    #[serde(default, deserialize_with = "text")]
    outcome: Option<String>,
}

impl MatchedCase {
    fn finding(self) -> Finding {
        // A zero match_score defers to similarity
        let score = self
            .match_score
            .filter(|s| *s != 0.0)
            .or(self.similarity)
            .unwrap_or(0.0);
        Finding {
            detail: self.description.or(self.outcome),
            score: Some(round_score(score)),
            ..Finding::new(self.name.or(self.case_id).unwrap_or_default())
        }
    }
}

pub fn normalize_case(payload: Option<&Value>) -> NormalizedResult {
    let findings: Vec<Finding> = decode::<CasePayload>(StepId::Case, payload)
        .and_then(|p| p.matched_cases)
        .unwrap_or_default()
        .into_iter()
        .map(MatchedCase::finding)
        .collect();

    let best = findings
        .iter()
        .filter_map(|f| f.score)
        .fold(None, |best: Option<f64>, s| Some(best.map_or(s, |b| b.max(s))));

    NormalizedResult::new(
        StepId::Case,
        vec![Section {
            title: "Similar Cases",
            findings,
        }],
        best.map(Metric::MatchScore),
    )
}

// ---------------------------------------------------------------------------
// treatment
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct TreatmentPayload {
    #[serde(default, deserialize_with = "lenient_items")]
    treatments: Option<Vec<Treatment>>,
}

#[derive(Deserialize)]
struct Treatment {
    #[serde(default, rename = "type", deserialize_with = "text")]
    kind: Option<String>,
    #[serde(default, deserialize_with = "text")]
    name: Option<String>,
    #[serde(default, deserialize_with = "text")]
    medication: Option<String>,
    #[serde(default, deserialize_with = "text")]
    source: Option<String>,
    #[serde(default, deserialize_with = "text")]
    class: Option<String>,
    #[serde(default, deserialize_with = "text")]
    rationale: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TreatmentKind {
    Drug,
    NonDrug,
    Unclassified,
}

impl Treatment {
    fn kind(&self) -> TreatmentKind {
        match self.kind.as_deref().map(str::to_lowercase) {
            Some(kind) if kind.contains("non-drug") => TreatmentKind::NonDrug,
            Some(kind) if kind.contains("drug") => TreatmentKind::Drug,
            _ => TreatmentKind::Unclassified,
        }
    }

    fn label(&mut self) -> String {
        self.name
            .take()
            .or_else(|| self.medication.take())
            .unwrap_or_default()
    }

    fn drug_finding(mut self) -> Finding {
        let detail = match (self.class.take(), self.rationale.take()) {
            (Some(class), Some(rationale)) => Some(format!("{} - {}", class, rationale)),
            (class, rationale) => class.or(rationale),
        };
        Finding {
            detail,
            source: self.source.take(),
            ..Finding::new(self.label())
        }
    }

    fn option_finding(mut self) -> Finding {
        Finding::new(self.label())
    }
}

pub fn normalize_treatment(payload: Option<&Value>) -> NormalizedResult {
    let mut drugs = Vec::new();
    let mut options = Vec::new();

    let treatments = decode::<TreatmentPayload>(StepId::Treatment, payload)
        .and_then(|p| p.treatments)
        .unwrap_or_default();
    for treatment in treatments {
        match treatment.kind() {
            TreatmentKind::Drug => drugs.push(treatment.drug_finding()),
            TreatmentKind::NonDrug => options.push(treatment.option_finding()),
            TreatmentKind::Unclassified => {}
        }
    }

    NormalizedResult::new(
        StepId::Treatment,
        vec![
            Section {
                title: "Drug Treatments",
                findings: drugs,
            },
            Section {
                title: "Non-Drug Options",
                findings: options,
            },
        ],
        None,
    )
}

// ---------------------------------------------------------------------------
// summary
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct SummaryPayload {
    #[serde(default, deserialize_with = "text")]
    patient_summary: Option<String>,
    #[serde(default, deserialize_with = "text")]
    clinical_summary: Option<String>,
    #[serde(default, deserialize_with = "lenient_items")]
    recommendations: Option<Vec<Recommendation>>,
    #[serde(default, deserialize_with = "text")]
    risk_level: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Recommendation {
    Plain(String),
    Structured(StructuredRecommendation),
}

#[derive(Deserialize)]
struct StructuredRecommendation {
    #[serde(default, deserialize_with = "text")]
    content: Option<String>,
}

impl Recommendation {
    fn into_text(self) -> Option<String> {
        match self {
            Recommendation::Plain(text) => Some(text),
            Recommendation::Structured(r) => r.content,
        }
    }
}

pub fn normalize_summary(payload: Option<&Value>) -> NormalizedResult {
    let decoded: Option<SummaryPayload> = decode(StepId::Summary, payload);

    let (findings, recommendations, metric) = match decoded {
        Some(p) => (
            [p.patient_summary, p.clinical_summary]
                .into_iter()
                .flatten()
                .map(Finding::new)
                .collect(),
            p.recommendations
                .unwrap_or_default()
                .into_iter()
                .filter_map(Recommendation::into_text)
                .map(Finding::new)
                .collect(),
            p.risk_level.map(Metric::RiskAssessment),
        ),
        None => (Vec::new(), Vec::new(), None),
    };

    NormalizedResult::new(
        StepId::Summary,
        vec![
            Section {
                title: "Key Findings",
                findings,
            },
            Section {
                title: "Recommendations",
                findings: recommendations,
            },
        ],
        metric,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn texts(result: &NormalizedResult, section: &str) -> Vec<String> {
        result
            .section(section)
            .unwrap()
            .findings
            .iter()
            .map(|f| f.text.clone())
            .collect()
    }

    #[test]
    fn absent_payload_is_empty_for_every_step() {
        for step in StepId::ALL {
            let result = normalize(step, None);
            assert!(result.is_empty(), "{} should be empty", step);
            assert_eq!(result.step, step);
            assert!(!result.sections.is_empty());
        }
    }

    #[test]
    fn empty_object_is_empty_for_every_step() {
        let payload = json!({});
        for step in StepId::ALL {
            assert!(normalize(step, Some(&payload)).is_empty());
        }
    }

    #[test]
    fn symptom_differentials_and_risk() {
        let payload = json!({
            "top_differentials": [
                {"name": "Angina", "rationale": "exertional pain", "icd10cm_code": "I20.9"},
                {"name": "GERD"}
            ],
            "risk_level": "high"
        });
        let result = normalize_symptom(Some(&payload));

        assert_eq!(
            texts(&result, "Key Findings"),
            vec!["Angina: exertional pain (ICD: I20.9)", "GERD"]
        );
        assert_eq!(result.metric, Some(Metric::RiskLevel("high".to_string())));
    }

    #[test]
    fn symptom_non_list_differentials_keep_risk() {
        let payload = json!({"top_differentials": "n/a", "risk_level": "low"});
        let result = normalize_symptom(Some(&payload));
        assert!(texts(&result, "Key Findings").is_empty());
        assert_eq!(result.metric, Some(Metric::RiskLevel("low".to_string())));
    }

    #[test]
    fn literature_title_with_pmid() {
        let payload = json!({"articles": [{"title": "X", "pmid": "123"}]});
        let result = normalize_literature(Some(&payload));
        let findings = &result.section("Relevant References").unwrap().findings;

        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].text, "X");
        assert_eq!(findings[0].pmid.as_deref(), Some("123"));
    }

    #[test]
    fn literature_summary_is_truncated_without_pmid() {
        let summary = "a long text ".repeat(10);
        let payload = json!({"articles": {"summaries": [{"summary": summary}]}});
        let result = normalize_literature(Some(&payload));
        let finding = &result.section("Relevant References").unwrap().findings[0];

        assert_eq!(finding.text.chars().count(), SUMMARY_HEADING_CHARS);
        assert!(summary.starts_with(&finding.text));
        assert!(finding.pmid.is_none());
    }

    #[test]
    fn literature_numeric_pmid_and_unknown_shape() {
        let payload = json!({"articles": [{"title": "Y", "pmid": 987}]});
        let result = normalize_literature(Some(&payload));
        assert_eq!(
            result.section("Relevant References").unwrap().findings[0]
                .pmid
                .as_deref(),
            Some("987")
        );

        let raw = json!({"articles": {"raw_output": "unparsed"}});
        assert!(normalize_literature(Some(&raw)).is_empty());
    }

    #[test]
    fn case_matches_use_fallback_fields() {
        let payload = json!({"matched_cases": [
            {"name": "Stable angina", "match_score": 0.876, "description": "chest pain on exertion"},
            {"caseId": "C-2024-001", "similarity": 92, "outcome": "recovered"},
            {"caseId": "C-7"}
        ]});
        let result = normalize_case(Some(&payload));
        let findings = &result.section("Similar Cases").unwrap().findings;

        assert_eq!(findings[0].text, "Stable angina");
        assert_eq!(findings[0].detail.as_deref(), Some("chest pain on exertion"));
        assert_eq!(findings[0].score, Some(0.88));
        assert_eq!(findings[1].text, "C-2024-001");
        assert_eq!(findings[1].detail.as_deref(), Some("recovered"));
        assert_eq!(findings[1].score, Some(92.0));
        assert_eq!(findings[2].score, Some(0.0));
        assert_eq!(result.metric, Some(Metric::MatchScore(92.0)));
    }

    #[test]
    fn treatments_are_partitioned_by_type() {
        let payload = json!({"treatments": [
            {"type": "drug", "name": "Aspirin", "class": "Antiplatelet", "rationale": "reduces risk", "source": "ACC"},
            {"type": "non-drug", "name": "Cardiac rehab", "class": "ignored"},
            {"type": "Drug", "medication": "Nitroglycerin"},
            {"name": "Untyped"}
        ]});
        let result = normalize_treatment(Some(&payload));
        let drugs = &result.section("Drug Treatments").unwrap().findings;

        assert_eq!(drugs.len(), 2);
        assert_eq!(drugs[0].text, "Aspirin");
        assert_eq!(drugs[0].detail.as_deref(), Some("Antiplatelet - reduces risk"));
        assert_eq!(drugs[0].source.as_deref(), Some("ACC"));
        assert_eq!(drugs[1].text, "Nitroglycerin");
        assert!(drugs[1].detail.is_none());

        let options = &result.section("Non-Drug Options").unwrap().findings;
        assert_eq!(options, &vec![Finding::new("Cardiac rehab")]);
    }

    #[test]
    fn summary_findings_and_mixed_recommendations() {
        let payload = json!({
            "patient_summary": "Plain words",
            "clinical_summary": "Technical words",
            "recommendations": ["Order ECG", {"type": "next_steps", "content": "Follow up"}, {"type": "x"}],
            "risk_level": "Moderate risk"
        });
        let result = normalize_summary(Some(&payload));

        assert_eq!(
            texts(&result, "Key Findings"),
            vec!["Plain words", "Technical words"]
        );
        assert_eq!(
            texts(&result, "Recommendations"),
            vec!["Order ECG", "Follow up"]
        );
        assert_eq!(
            result.metric,
            Some(Metric::RiskAssessment("Moderate risk".to_string()))
        );
    }

    #[test]
    fn malformed_list_entries_are_skipped_individually() {
        let symptom = json!({"top_differentials": [
            {"name": "Angina", "rationale": "exertional pain", "icd10cm_code": "I20.9"},
            null,
            ["Angina", "positional"]
        ]});
        assert_eq!(
            texts(&normalize_symptom(Some(&symptom)), "Key Findings"),
            vec!["Angina: exertional pain (ICD: I20.9)"]
        );

        let literature = json!({"articles": [{"title": "X", "pmid": "1"}, "stray"]});
        let result = normalize_literature(Some(&literature));
        assert_eq!(texts(&result, "Relevant References"), vec!["X"]);

        let summarized = json!({"articles": {"summaries": [7, {"title": "Y"}]}});
        let result = normalize_literature(Some(&summarized));
        assert_eq!(texts(&result, "Relevant References"), vec!["Y"]);

        let cases = json!({"matched_cases": [false, {"caseId": "C-9", "similarity": 0.5}]});
        let result = normalize_case(Some(&cases));
        assert_eq!(texts(&result, "Similar Cases"), vec!["C-9"]);
        assert_eq!(result.metric, Some(Metric::MatchScore(0.5)));

        let treatments = json!({"treatments": ["aspirin", {"type": "drug", "name": "Aspirin"}]});
        let result = normalize_treatment(Some(&treatments));
        assert_eq!(texts(&result, "Drug Treatments"), vec!["Aspirin"]);

        let summary = json!({"recommendations": ["Order ECG", 42, null]});
        assert_eq!(
            texts(&normalize_summary(Some(&summary)), "Recommendations"),
            vec!["Order ECG"]
        );
    }

    #[test]
    fn non_object_payload_is_empty() {
        let payload = json!(["not", "an", "object"]);
        assert!(normalize_summary(Some(&payload)).is_empty());
        assert!(normalize_treatment(Some(&payload)).is_empty());
    }
}
