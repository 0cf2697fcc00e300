//! Remote generative evaluator backed by the Gemini `generateContent` API.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use bandscore_core::error::BackendError;
use bandscore_core::model::TaskKind;
use bandscore_core::scale::ScoreScale;
use bandscore_core::traits::{
    extract_json_object, parse_score_verdict, BackendVerdict, ScoreRequest, ScoringBackend,
};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Which rubric the evaluator is asked to apply in test mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RubricFraming {
    /// Strict 0–5 integer rubric.
    #[default]
    Strict,
    /// 0–9 band score in half points.
    Band,
}

impl RubricFraming {
    pub fn scale(self) -> ScoreScale {
        match self {
            RubricFraming::Strict => ScoreScale::ZeroToFive,
            RubricFraming::Band => ScoreScale::ZeroToNine,
        }
    }
}

/// Formative feedback for a single learner sentence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningFeedback {
    /// `correct`, `almost`, `incorrect`, or `unknown`/`error` when the model misbehaved.
    pub status: String,
    pub title: String,
    pub feedback: String,
    pub corrected_text: String,
}

/// Gemini evaluator.
pub struct GeminiScorer {
    api_key: String,
    base_url: String,
    model: String,
    framing: RubricFraming,
    client: reqwest::Client,
}

impl GeminiScorer {
    pub fn new(
        api_key: &str,
        base_url: Option<String>,
        model: Option<String>,
        framing: RubricFraming,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .expect("failed to build HTTP client");

        Self {
            api_key: api_key.to_string(),
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            framing,
            client,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Learning-mode evaluation of a short sentence.
    ///
    /// Output that is not a JSON object yields an `error` status with the
    /// original text echoed back; missing fields get safe defaults.
    #[instrument(skip(self, text), fields(model = %self.model))]
    pub async fn coach(&self, text: &str) -> anyhow::Result<LearningFeedback> {
        let output = self.generate(&learning_prompt(text)).await?;
        Ok(parse_learning_feedback(&output, text))
    }

    async fn generate(&self, prompt: &str) -> Result<String, BackendError> {
        let body = GenerateContentRequest {
            contents: vec![Content {
                role: "user".to_string(),
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: 0.0,
                response_mime_type: "application/json".to_string(),
            },
        };

        let response = self
            .client
            .post(format!(
                "{}/v1beta/models/{}:generateContent",
                self.base_url, self.model
            ))
            .header("x-goog-api-key", &self.api_key)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    BackendError::Timeout(DEFAULT_TIMEOUT_SECS)
                } else {
                    BackendError::NetworkError(e.to_string())
                }
            })?;

        let status = response.status().as_u16();
        if status == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(5)
                * 1000;
            return Err(BackendError::RateLimited {
                retry_after_ms: retry_after,
            });
        }
        if status == 401 || status == 403 {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::AuthenticationFailed(error_message(body)));
        }
        if status >= 400 {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::ApiError {
                status,
                message: error_message(body),
            });
        }

        let api_response: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| {
                BackendError::MalformedResponse(format!("failed to parse response: {e}"))
            })?;

        api_response
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .and_then(|c| c.parts.into_iter().next())
            .map(|p| p.text.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| BackendError::MalformedResponse("response contained no text".into()))
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f64,
    response_mime_type: String,
}

#[derive(Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    role: String,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

#[derive(Deserialize)]
struct GeminiError {
    error: GeminiErrorBody,
}

#[derive(Deserialize)]
struct GeminiErrorBody {
    message: String,
}

fn error_message(body: String) -> String {
    serde_json::from_str::<GeminiError>(&body)
        .map(|e| e.error.message)
        .unwrap_or(body)
}

fn test_prompt(request: &ScoreRequest, framing: RubricFraming) -> String {
    let rubric = match framing {
        RubricFraming::Strict => {
            "Score strictly on a 0-5 integer scale:\n\
             5: Excellent. Clear, effective, minimal errors.\n\
             4: Good. Solid, some minor issues.\n\
             3: Fair. Noticeable issues, generally understandable.\n\
             2: Limited. Frequent errors, insufficient development.\n\
             1: Weak. Hard to understand, serious errors.\n\
             0: Off-topic or unintelligible."
        }
        RubricFraming::Band => {
            "Score on the 0-9 band scale in steps of 0.5:\n\
             9: Expert. Fully operational command, fluent and precise.\n\
             7-8: Good to very good. Occasional inaccuracies, handles complex language.\n\
             5-6: Modest to competent. Partial command, noticeable errors.\n\
             3-4: Limited. Frequent breakdowns in communication.\n\
             1-2: Intermittent or non user. Isolated words only.\n\
             0: Off-topic, unintelligible or not attempted."
        }
    };
    let range = match framing {
        RubricFraming::Strict => "<int 0-5>",
        RubricFraming::Band => "<number 0-9>",
    };

    let mut prompt = format!(
        "Act as an examiner for a {} task. Evaluate the response objectively.\n\
         Tone: neutral and formal. Do not correct or teach.\n\n{rubric}\n\n",
        describe(request.kind)
    );
    if let Some(task_prompt) = &request.prompt {
        prompt.push_str(&format!("Task prompt: \"{task_prompt}\"\n"));
    }
    prompt.push_str(&format!(
        "Response: \"{}\"\n\n\
         Output JSON only:\n\
         {{\"score\": {range}, \"feedback\": [\"Grammar/Language\", \"Content Relevance\", \"Organization\", \"Vocabulary\"]}}",
        request.text
    ));
    prompt
}

fn learning_prompt(text: &str) -> String {
    format!(
        "Act as an English writing evaluator for a learning app. \
         Evaluate the student's sentence and answer with JSON only:\n\
         {{\"status\": \"correct|almost|incorrect\", \"title\": \"short title\", \
         \"feedback\": \"very short, friendly feedback\", \
         \"corrected_text\": \"corrected version, or the original if already correct\"}}\n\n\
         Student sentence: \"{text}\""
    )
}

fn describe(kind: TaskKind) -> String {
    format!("{} ({})", kind.section, kind.task_type)
}

fn parse_learning_feedback(output: &str, original: &str) -> LearningFeedback {
    let parsed = extract_json_object(output)
        .and_then(|json| serde_json::from_str::<serde_json::Value>(json).ok())
        .filter(serde_json::Value::is_object);

    let Some(value) = parsed else {
        return LearningFeedback {
            status: "error".into(),
            title: "Error".into(),
            feedback: "Unable to process response format.".into(),
            corrected_text: original.to_string(),
        };
    };

    let field = |name: &str, default: &str| {
        value
            .get(name)
            .and_then(serde_json::Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(default)
            .to_string()
    };

    LearningFeedback {
        status: field("status", "unknown"),
        title: field("title", "Info"),
        feedback: field("feedback", "Feedback unavailable."),
        corrected_text: field("corrected_text", original),
    }
}

#[async_trait]
impl ScoringBackend for GeminiScorer {
    fn name(&self) -> &str {
        "gemini"
    }

    fn scale(&self) -> ScoreScale {
        self.framing.scale()
    }

    #[instrument(skip(self, request), fields(model = %self.model, kind = %request.kind))]
    async fn score(&self, request: &ScoreRequest) -> anyhow::Result<BackendVerdict> {
        let output = self.generate(&test_prompt(request, self.framing)).await?;
        Ok(parse_score_verdict(&output)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bandscore_core::model::{Section, TaskType};
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const MODEL_PATH: &str = "/v1beta/models/gemini-2.5-flash:generateContent";

    fn request(text: &str) -> ScoreRequest {
        ScoreRequest {
            text: text.into(),
            kind: TaskKind::new(Section::Writing, TaskType::Independent),
            prompt: Some("Do you agree that technology improves daily life?".into()),
        }
    }

    fn candidate(text: &str) -> serde_json::Value {
        serde_json::json!({
            "candidates": [{"content": {"role": "model", "parts": [{"text": text}]}}]
        })
    }

    #[tokio::test]
    async fn successful_scoring() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(MODEL_PATH))
            .and(header("x-goog-api-key", "test-key"))
            .and(body_string_contains("technology improves daily life"))
            .respond_with(ResponseTemplate::new(200).set_body_json(candidate(
                "```json\n{\"score\": 4, \"feedback\": [\"Organization\", \"Vocabulary\"]}\n```",
            )))
            .mount(&server)
            .await;

        let scorer = GeminiScorer::new("test-key", Some(server.uri()), None, RubricFraming::Strict);
        let verdict = scorer.score(&request("Technology helps us.")).await.unwrap();
        assert_eq!(verdict.native_score, 4.0);
        assert_eq!(verdict.feedback, vec!["Organization", "Vocabulary"]);
        assert_eq!(scorer.scale(), ScoreScale::ZeroToFive);
    }

    #[tokio::test]
    async fn band_framing_uses_nine_point_scale() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(MODEL_PATH))
            .and(body_string_contains("0-9 band scale"))
            .respond_with(ResponseTemplate::new(200).set_body_json(candidate(r#"{"score": 6.5}"#)))
            .mount(&server)
            .await;

        let scorer = GeminiScorer::new("test-key", Some(server.uri()), None, RubricFraming::Band);
        let verdict = scorer.score(&request("An answer.")).await.unwrap();
        assert_eq!(verdict.native_score, 6.5);
        assert_eq!(scorer.scale(), ScoreScale::ZeroToNine);
    }

    #[tokio::test]
    async fn unparseable_output_is_malformed() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(MODEL_PATH))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(candidate("I would give this a four.")),
            )
            .mount(&server)
            .await;

        let scorer = GeminiScorer::new("test-key", Some(server.uri()), None, RubricFraming::Strict);
        let err = scorer.score(&request("An answer.")).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BackendError>(),
            Some(BackendError::MalformedResponse(_))
        ));
    }

    #[tokio::test]
    async fn empty_candidates_are_malformed() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(MODEL_PATH))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"candidates": []})),
            )
            .mount(&server)
            .await;

        let scorer = GeminiScorer::new("test-key", Some(server.uri()), None, RubricFraming::Strict);
        let err = scorer.score(&request("An answer.")).await.unwrap_err();
        assert!(err.to_string().contains("no text"));
    }

    #[tokio::test]
    async fn authentication_failure() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(MODEL_PATH))
            .respond_with(ResponseTemplate::new(403).set_body_json(serde_json::json!({
                "error": {"code": 403, "message": "API key not valid", "status": "PERMISSION_DENIED"}
            })))
            .mount(&server)
            .await;

        let scorer = GeminiScorer::new("bad-key", Some(server.uri()), None, RubricFraming::Strict);
        let err = scorer.score(&request("An answer.")).await.unwrap_err();
        assert!(err.to_string().contains("authentication"));
        assert!(err.to_string().contains("API key not valid"));
    }

    #[tokio::test]
    async fn rate_limiting() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(MODEL_PATH))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "5"))
            .mount(&server)
            .await;

        let scorer = GeminiScorer::new("test-key", Some(server.uri()), None, RubricFraming::Strict);
        let err = scorer.score(&request("An answer.")).await.unwrap_err();
        assert!(err.to_string().contains("rate limited"));
    }

    #[tokio::test]
    async fn coach_returns_learning_feedback() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(MODEL_PATH))
            .and(body_string_contains("I has an apple"))
            .respond_with(ResponseTemplate::new(200).set_body_json(candidate(
                r#"{"status": "almost", "title": "Almost there", "feedback": "Use 'have' with I.", "corrected_text": "I have an apple."}"#,
            )))
            .mount(&server)
            .await;

        let scorer = GeminiScorer::new("test-key", Some(server.uri()), None, RubricFraming::Strict);
        let feedback = scorer.coach("I has an apple").await.unwrap();
        assert_eq!(feedback.status, "almost");
        assert_eq!(feedback.corrected_text, "I have an apple.");
    }

    #[test]
    fn learning_feedback_defaults() {
        let feedback = parse_learning_feedback(r#"{"status": "correct"}"#, "I have an apple");
        assert_eq!(feedback.status, "correct");
        assert_eq!(feedback.title, "Info");
        assert_eq!(feedback.feedback, "Feedback unavailable.");
        assert_eq!(feedback.corrected_text, "I have an apple");

        let feedback = parse_learning_feedback("no json here", "I have an apple");
        assert_eq!(feedback.status, "error");
        assert_eq!(feedback.corrected_text, "I have an apple");
    }

    #[test]
    fn test_prompt_mentions_task_and_rubric() {
        let prompt = test_prompt(&request("My answer."), RubricFraming::Strict);
        assert!(prompt.contains("writing (independent)"));
        assert!(prompt.contains("0-5 integer scale"));
        assert!(prompt.contains("Response: \"My answer.\""));
    }
}
