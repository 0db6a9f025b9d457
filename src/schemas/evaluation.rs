//! The final grading result. It is kept as the JSON object the grading service produced and
//! only decoded into [`EssayEvaluation`] by the code that needs typed fields.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use validator::Validate;

const DEFAULT_DENOMINATOR: &str = "100";
const SCORES_POINTER: &str = "/aiEvaluation/scoreEvaluations/scores";
const COMMENTS_POINTER: &str = "/aiEvaluation/scoreEvaluations/comments";

#[derive(Debug, Error, PartialEq, Eq)]
pub(crate) enum PayloadError {
    #[error("grading result is empty")]
    Empty,
    #[error("grading result must be a JSON object")]
    NotAnObject,
    #[error("grading result does not match the evaluation schema: {0}")]
    Schema(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub(crate) struct GradingPayload(Value);

impl GradingPayload {
    pub(crate) fn new(value: Value) -> Result<Self, PayloadError> {
        match &value {
            Value::Null => Err(PayloadError::Empty),
            Value::Object(map) if map.is_empty() => Err(PayloadError::Empty),
            Value::Object(_) => Ok(Self(value)),
            _ => Err(PayloadError::NotAnObject),
        }
    }

    pub(crate) fn as_value(&self) -> &Value {
        &self.0
    }

    pub(crate) fn into_value(self) -> Value {
        self.0
    }

    pub(crate) fn decode(&self) -> Result<EssayEvaluation, PayloadError> {
        serde_json::from_value(self.0.clone()).map_err(|err| PayloadError::Schema(err.to_string()))
    }

    /// Overall score as stored on a submission: the numerator of `allWithTotal` when
    /// present, otherwise the integer `all` score.
    pub(crate) fn grade_result(&self) -> Result<String, PayloadError> {
        self.decode()?
            .grade_result()
            .ok_or_else(|| PayloadError::Schema("missing overall score".into()))
    }

    pub(crate) fn apply(&mut self, edit: &EvaluationEdit) {
        for (dimension, change) in edit.dimensions() {
            if let Some(text) = &change.text {
                self.set_comment(dimension.comment_key(), text);
            }
            if let Some(score) = change.score {
                self.set_score(dimension, score);
            }
        }
        if let Some(suggestion) = &edit.suggestion {
            let suggestions = object_at(&mut self.0, "/aiEvaluation/suggestionEvaluation");
            suggestions.insert("suggestionDescription".into(), Value::String(suggestion.clone()));
        }
    }

    fn set_comment(&mut self, key: &str, text: &str) {
        if key == "comment" {
            let evaluation = object_at(&mut self.0, "/aiEvaluation/scoreEvaluations");
            evaluation.insert(key.into(), Value::String(text.to_string()));
        } else {
            let comments = object_at(&mut self.0, COMMENTS_POINTER);
            comments.insert(key.into(), Value::String(text.to_string()));
        }
    }

    fn set_score(&mut self, dimension: Dimension, score: i64) {
        let scores = object_at(&mut self.0, SCORES_POINTER);
        let with_total_key = format!("{}WithTotal", dimension.score_key());
        let denominator = scores
            .get(&with_total_key)
            .and_then(Value::as_str)
            .and_then(|value| value.split_once('/').map(|(_, total)| total.to_string()))
            .unwrap_or_else(|| DEFAULT_DENOMINATOR.to_string());

        scores.insert(with_total_key, Value::String(format!("{score}/{denominator}")));
        scores.insert(dimension.score_key().into(), Value::from(score));
    }
}

/// Walks `pointer` from `root`, replacing missing or non-object nodes with empty objects.
fn object_at<'a>(root: &'a mut Value, pointer: &str) -> &'a mut Map<String, Value> {
    let mut current = root;
    for segment in pointer.split('/').filter(|segment| !segment.is_empty()) {
        current = ensure_object(current).entry(segment).or_insert(Value::Null);
    }
    ensure_object(current)
}

fn ensure_object(value: &mut Value) -> &mut Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => {
            *other = Value::Object(Map::new());
            ensure_object(other)
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct EssayEvaluation {
    #[serde(default)]
    pub(crate) ai_evaluation: AiEvaluation,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AiEvaluation {
    #[serde(default, rename = "scoreEvaluations")]
    pub(crate) score_evaluation: ScoreEvaluation,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct ScoreEvaluation {
    #[serde(default)]
    pub(crate) scores: Scores,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Scores {
    pub(crate) all: Option<i64>,
    pub(crate) all_with_total: Option<String>,
}

impl EssayEvaluation {
    pub(crate) fn grade_result(&self) -> Option<String> {
        let scores = &self.ai_evaluation.score_evaluation.scores;
        scores
            .all_with_total
            .as_deref()
            .and_then(|value| value.split('/').next())
            .map(str::trim)
            .filter(|numerator| !numerator.is_empty())
            .map(str::to_string)
            .or_else(|| scores.all.map(|all| all.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dimension {
    Content,
    Expression,
    Structure,
    Development,
    Overall,
}

impl Dimension {
    fn comment_key(self) -> &'static str {
        match self {
            Self::Content => "content",
            Self::Expression => "expression",
            Self::Structure => "structure",
            Self::Development => "development",
            Self::Overall => "comment",
        }
    }

    fn score_key(self) -> &'static str {
        match self {
            Self::Overall => "all",
            other => other.comment_key(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub(crate) struct DimensionEdit {
    #[validate(length(max = 5000))]
    pub(crate) text: Option<String>,
    #[validate(range(min = 0, max = 1000))]
    pub(crate) score: Option<i64>,
}

/// A teacher's correction of a stored evaluation. Absent fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub(crate) struct EvaluationEdit {
    #[validate(nested)]
    pub(crate) content: Option<DimensionEdit>,
    #[validate(nested)]
    pub(crate) expression: Option<DimensionEdit>,
    #[validate(nested)]
    pub(crate) structure: Option<DimensionEdit>,
    #[validate(nested)]
    pub(crate) development: Option<DimensionEdit>,
    #[validate(nested)]
    pub(crate) overall_comment: Option<DimensionEdit>,
    #[validate(length(max = 5000))]
    pub(crate) suggestion: Option<String>,
}

impl EvaluationEdit {
    fn dimensions(&self) -> impl Iterator<Item = (Dimension, &DimensionEdit)> {
        [
            (Dimension::Content, self.content.as_ref()),
            (Dimension::Expression, self.expression.as_ref()),
            (Dimension::Structure, self.structure.as_ref()),
            (Dimension::Development, self.development.as_ref()),
            (Dimension::Overall, self.overall_comment.as_ref()),
        ]
        .into_iter()
        .filter_map(|(dimension, edit)| edit.map(|edit| (dimension, edit)))
    }
}
