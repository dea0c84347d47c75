//! llm_as_judge 工作流：多个模型并行作答，再由裁判模型挑选最佳答案

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::core::AgentError;
use crate::durable::{DurableContext, Workflow};
use crate::workflow::{input_str, WorkflowDeps};

pub const DEFAULT_QUESTION: &str = "Write an 100 word summary on the great fire of London";

/// 候选答案
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub model_id: String,
    pub answer: String,
}

/// 裁判结论
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Judgment {
    pub best_answer: String,
    pub reasoning: String,
    pub source_model: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Verdict {
    best_index: Option<i64>,
    reasoning: Option<String>,
}

pub struct LlmAsJudgeWorkflow {
    deps: WorkflowDeps,
}

impl LlmAsJudgeWorkflow {
    pub fn new(deps: WorkflowDeps) -> Self {
        Self { deps }
    }
}

fn judge_prompt(question: &str, candidates: &[Candidate]) -> String {
    let responses: Vec<String> = candidates
        .iter()
        .enumerate()
        .map(|(i, c)| format!("{}. (Model: {}) {}", i + 1, c.model_id, c.answer))
        .collect();
    format!(
        "Question: \"{question}\"\n\nResponses:\n{}\n\nWhich response is best? Reply with JSON: {{\"bestIndex\": <1-based index>, \"reasoning\": \"<why>\"}}",
        responses.join("\n")
    )
}

/// 从裁判回复中取出结论：取第一个 `{` 到最后一个 `}`；没有 JSON 时按第 1 个候选、空理由处理。
/// JSON 存在但无法解析时报错（由 step 重试）
fn parse_judgment(response: &str, candidates: &[Candidate]) -> Result<Judgment, AgentError> {
    let re = Regex::new(r"(?s)\{.*\}").map_err(|e| AgentError::Config(e.to_string()))?;
    let verdict: Verdict = match re.find(response) {
        Some(m) => serde_json::from_str(m.as_str())
            .map_err(|e| AgentError::MalformedResponse(format!("judge reply: {e}")))?,
        None => Verdict::default(),
    };
    let best = verdict
        .best_index
        .unwrap_or(1)
        .checked_sub(1)
        .and_then(|i| usize::try_from(i).ok())
        .and_then(|i| candidates.get(i))
        .or_else(|| candidates.first())
        .ok_or_else(|| AgentError::InferenceFailed("no candidate answers".to_string()))?;
    Ok(Judgment {
        best_answer: best.answer.clone(),
        reasoning: verdict.reasoning.unwrap_or_default(),
        source_model: best.model_id.clone(),
    })
}

#[async_trait]
impl Workflow for LlmAsJudgeWorkflow {
    fn name(&self) -> &str {
        "llm_as_judge"
    }

    async fn run(&self, input: Value, ctx: &DurableContext) -> Result<Value, AgentError> {
        let question = input_str(&input, "question", DEFAULT_QUESTION)?;
        let gateway = &self.deps.gateway;
        let question_ref = question.as_str();
        let models = vec![self.deps.small_model.clone(), self.deps.model.clone()];

        let result = ctx
            .map_with_namer(
                "Get candidate answers",
                models,
                |model: &String, _| format!("candidate-{model}"),
                move |_child, model_id: String, _| async move {
                    let answer = gateway.converse_text(&model_id, question_ref).await?;
                    Ok::<_, AgentError>(Candidate { model_id, answer })
                },
            )
            .await?;
        if let Some((name, error)) = result.first_failure() {
            return Err(AgentError::InferenceFailed(format!("{name}: {error}")));
        }
        let candidates = result.into_results();

        let judge_model = self.deps.small_model.as_str();
        let prompt = judge_prompt(&question, &candidates);
        let prompt_ref = prompt.as_str();
        let candidates_ref = candidates.as_slice();
        let judgment: Judgment = ctx
            .step("judge", move || async move {
                let response = gateway.converse_text(judge_model, prompt_ref).await?;
                parse_judgment(&response, candidates_ref)
            })
            .await?;

        Ok(json!({
            "question": question,
            "bestAnswer": judgment.best_answer,
            "reasoning": judgment.reasoning,
            "sourceModel": judgment.source_model,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidates() -> Vec<Candidate> {
        vec![
            Candidate {
                model_id: "small".into(),
                answer: "A".into(),
            },
            Candidate {
                model_id: "large".into(),
                answer: "B".into(),
            },
        ]
    }

    #[test]
    fn test_parse_judgment_picks_index() {
        let j = parse_judgment(
            "Sure! {\"bestIndex\": 2, \"reasoning\": \"more detail\"} done",
            &candidates(),
        )
        .unwrap();
        assert_eq!(j.best_answer, "B");
        assert_eq!(j.source_model, "large");
        assert_eq!(j.reasoning, "more detail");
    }

    #[test]
    fn test_parse_judgment_falls_back() {
        let j = parse_judgment("no json here", &candidates()).unwrap();
        assert_eq!(j.best_answer, "A");
        assert_eq!(j.reasoning, "");

        let j = parse_judgment("{\"bestIndex\": 9}", &candidates()).unwrap();
        assert_eq!(j.source_model, "small");
    }

    #[test]
    fn test_parse_judgment_out_of_range_index_falls_back() {
        for reply in [
            "{\"bestIndex\": -9223372036854775808}",
            "{\"bestIndex\": 0}",
            "{\"bestIndex\": -1}",
            "{\"bestIndex\": 9223372036854775807}",
        ] {
            let j = parse_judgment(reply, &candidates()).unwrap();
            assert_eq!(j.best_answer, "A", "reply {reply}");
            assert_eq!(j.source_model, "small");
        }
    }

    #[test]
    fn test_prompt_numbers_candidates() {
        let p = judge_prompt("Q?", &candidates());
        assert!(p.contains("1. (Model: small) A"));
        assert!(p.contains("2. (Model: large) B"));
        assert!(p.ends_with("\"reasoning\": \"<why>\"}"));
    }
}
