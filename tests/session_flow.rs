//! End-to-end session tests
//!
//! Drives whole sessions with a scripted generator, human and executor.

use std::sync::Arc;

use deusflow::audit::LogKind;
use deusflow::domain::Tool;
use deusflow::feedback::FailureCategory;
use deusflow::generator::{ScriptedGenerator, accept, reject};
use deusflow::human::ScriptedHuman;
use deusflow::pipeline::{ESTABLISH_SCOPE, PLANNING, Services, Session, SessionConfig, SessionReport, TASK_HANDLING};
use deusflow::prompt::{PromptCatalog, PromptKind};
use deusflow::tools::{Execution, ScriptedExecutor, StaticToolCatalog};
use serde_json::json;
use tokio_util::sync::CancellationToken;

const QUERY: &str = "I want a small command-line word counter written in Rust";

const VALIDATORS: &[PromptKind] = &[
    PromptKind::ValidateGoal,
    PromptKind::ValidateRequirements,
    PromptKind::ValidateMerge,
    PromptKind::ValidateScope,
    PromptKind::ValidateDescription,
    PromptKind::ValidateCreatePlan,
    PromptKind::ValidateUpdatePlan,
    PromptKind::ValidateToolSelection,
    PromptKind::ValidateAction,
];

fn tools() -> Vec<Tool> {
    vec![
        Tool::new("cargo_new", "Create a new Rust crate with cargo", "crate name"),
        Tool::new("write_file", "Write source code into a file", "path, newline, file contents"),
    ]
}

fn two_step_plan() -> String {
    json!({
        "plan": {
            "create_crate": "Create a new Rust crate named wordcount",
            "write_main": "Write the word counting source file",
        }
    })
    .to_string()
}

/// Replies for a word counter session where every validator accepts.
fn word_counter_script() -> ScriptedGenerator {
    word_counter_choosing(&["cargo_new", "write_file"])
}

/// Same session, with the tool selector answering `selections` in order.
fn word_counter_choosing(selections: &[&str]) -> ScriptedGenerator {
    let mut generator = ScriptedGenerator::new()
        .always(
            PromptKind::RetrieveGoal,
            json!({"user_goal": "Build a Rust command-line tool that counts words"}).to_string(),
        )
        .always(
            PromptKind::AskUser,
            json!({"questions": ["Where does the text come from?", "What should be printed?"]}).to_string(),
        )
        .always(
            PromptKind::RetrieveRequirements,
            json!({"requirements": ["read the file named by the first argument", "print the word count"]})
                .to_string(),
        )
        .always(
            PromptKind::DescribeScope,
            json!({"description": "A Rust binary that reads the file named by its first argument and prints its word count."})
                .to_string(),
        )
        .always(PromptKind::CreatePlan, two_step_plan())
        .always(PromptKind::UpdatePlan, two_step_plan())
        .always(
            PromptKind::TurnToAction,
            json!({"action": {"tool_input": "wordcount"}}).to_string(),
        );
    for tool in selections {
        generator = generator.reply(PromptKind::ToolSelection, json!({ "tool": tool }).to_string());
    }
    for kind in VALIDATORS {
        generator = generator.always(*kind, accept("looks right"));
    }
    generator
}

fn services(
    generator: Arc<ScriptedGenerator>,
    human: Arc<ScriptedHuman>,
    executor: Arc<ScriptedExecutor>,
    config: SessionConfig,
    cancel: CancellationToken,
) -> Arc<Services> {
    Arc::new(Services::with_cancel(
        generator,
        PromptCatalog::builtin().unwrap(),
        Arc::new(StaticToolCatalog::new(tools())),
        executor,
        human,
        config,
        cancel,
    ))
}

struct Harness {
    generator: Arc<ScriptedGenerator>,
    human: Arc<ScriptedHuman>,
    executor: Arc<ScriptedExecutor>,
    config: SessionConfig,
    cancel: CancellationToken,
}

impl Harness {
    fn new(generator: ScriptedGenerator) -> Self {
        Self {
            generator: Arc::new(generator),
            human: Arc::new(ScriptedHuman::new(["From a file path argument, print just the number"])),
            executor: Arc::new(ScriptedExecutor::new()),
            config: SessionConfig::default(),
            cancel: CancellationToken::new(),
        }
    }

    fn with_human(mut self, human: ScriptedHuman) -> Self {
        self.human = Arc::new(human);
        self
    }

    fn with_executor(mut self, executor: ScriptedExecutor) -> Self {
        self.executor = Arc::new(executor);
        self
    }

    fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    async fn run(&self) -> SessionReport {
        let services = services(
            self.generator.clone(),
            self.human.clone(),
            self.executor.clone(),
            self.config.clone(),
            self.cancel.clone(),
        );
        Session::new(QUERY, services).run().await.unwrap()
    }
}

fn halted_category(report: &SessionReport) -> Option<FailureCategory> {
    report.halted.as_ref().and_then(|f| f.category())
}

#[tokio::test]
async fn test_word_counter_session_finishes() {
    let harness = Harness::new(word_counter_script());
    let report = harness.run().await;

    assert!(report.finished(), "halted: {:?}", report.halted);
    assert!(report.halted.is_none());

    let plan = report.context.plan.as_ref().unwrap();
    assert_eq!(plan.len(), 2);
    assert!(plan.steps().iter().all(|s| s.is_accomplished()));
    assert_eq!(plan.steps()[0].action.as_ref().unwrap().tool.name, "cargo_new");
    assert_eq!(plan.steps()[1].action.as_ref().unwrap().tool.name, "write_file");

    // one record per planning pass after the first
    assert_eq!(report.logger.len(), 2);
    assert_eq!(
        report.visited,
        vec![ESTABLISH_SCOPE, PLANNING, TASK_HANDLING, PLANNING, TASK_HANDLING]
    );

    let scope = &report.context.scope;
    assert_eq!(scope.requirements.len(), 2);
    assert!(scope.description.is_some());
    assert_eq!(harness.human.asked().len(), 1);
    assert_eq!(harness.executor.calls().len(), 2);
    assert_eq!(report.feedback.len(), 5);
    assert!(report.feedback.success().unwrap());
}

#[tokio::test]
async fn test_session_writes_trail() {
    let harness = Harness::new(word_counter_script());
    let report = harness.run().await;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("trail.jsonl");
    report.logger.write_jsonl(&path).unwrap();

    let content = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), report.logger.len());
    let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
    assert!(first["logs"].as_array().is_some_and(|logs| !logs.is_empty()));
}

#[tokio::test]
async fn test_malformed_plan_halts_without_plan() {
    let generator = word_counter_script().reply(PromptKind::CreatePlan, "I cannot help with that");
    let harness = Harness::new(generator);
    let report = harness.run().await;

    assert!(!report.finished());
    assert!(report.context.plan.is_none());
    assert_eq!(halted_category(&report), Some(FailureCategory::MalformedOutput));
    assert_eq!(harness.generator.calls_for(PromptKind::ValidateCreatePlan), 0);
    assert!(!report.logger.entries().any(|e| matches!(&e.kind, LogKind::PlanUpdate { plan: Some(_), .. })));
    assert_eq!(report.visited, vec![ESTABLISH_SCOPE, PLANNING]);
}

#[tokio::test]
async fn test_rejected_description_is_corrected() {
    let generator = word_counter_script().reply(
        PromptKind::ValidateDescription,
        reject("too vague", "mention the file argument"),
    );
    let harness = Harness::new(generator);
    let report = harness.run().await;

    assert!(report.finished());
    let produced = report.logger.entries().filter(|e| e.is_retrieval_of("description")).count();
    let judged = report.logger.entries().filter(|e| e.is_validation_of("description")).count();
    assert_eq!((produced, judged), (2, 2));

    let describe_prompts: Vec<String> = harness
        .generator
        .prompts()
        .into_iter()
        .filter(|p| PromptKind::from_tagged(p) == Some(PromptKind::DescribeScope))
        .collect();
    assert_eq!(describe_prompts.len(), 2);
    assert!(!describe_prompts[0].contains("mention the file argument"));
    assert!(describe_prompts[1].contains("mention the file argument"));
}

#[tokio::test]
async fn test_goal_rejected_until_exhausted() {
    let generator = word_counter_script().always(PromptKind::ValidateGoal, reject("not a goal", "try again"));
    let config = SessionConfig {
        max_attempts: 3,
        ..SessionConfig::default()
    };
    let harness = Harness::new(generator).with_config(config);
    let report = harness.run().await;

    assert!(!report.finished());
    assert_eq!(harness.generator.calls_for(PromptKind::RetrieveGoal), 3);
    assert_eq!(harness.generator.calls_for(PromptKind::ValidateGoal), 3);
    assert_eq!(halted_category(&report), Some(FailureCategory::RetryExhausted));
    assert!(report.context.scope.user_goal.is_none());
    assert_eq!(report.visited, vec![ESTABLISH_SCOPE]);
}

#[tokio::test]
async fn test_stop_answer_aborts_scope() {
    let harness = Harness::new(word_counter_script()).with_human(ScriptedHuman::new(["  STOP "]));
    let report = harness.run().await;

    assert!(!report.finished());
    assert_eq!(halted_category(&report), Some(FailureCategory::Aborted));
    assert_eq!(harness.generator.calls_for(PromptKind::RetrieveRequirements), 0);
    assert_eq!(harness.generator.calls_for(PromptKind::CreatePlan), 0);
}

#[tokio::test]
async fn test_incomplete_scope_asks_again_and_merges() {
    let generator = word_counter_script()
        .reply(
            PromptKind::ValidateScope,
            reject("output format unknown", "ask how the count is printed"),
        )
        .reply(
            PromptKind::RetrieveRequirements,
            json!({"requirements": ["read the file named by the first argument"]}).to_string(),
        )
        .reply(
            PromptKind::RetrieveRequirements,
            json!({"requirements": ["print the count followed by a newline"]}).to_string(),
        )
        .always(
            PromptKind::MergeRequirements,
            json!({"requirements": [
                "read the file named by the first argument",
                "print the count followed by a newline"
            ]})
            .to_string(),
        );
    let human = ScriptedHuman::new(["A file path", "Just the number and a newline"]);
    let harness = Harness::new(generator).with_human(human);
    let report = harness.run().await;

    assert!(report.finished());
    assert_eq!(harness.human.asked().len(), 2);
    assert_eq!(harness.generator.calls_for(PromptKind::AskUser), 2);
    assert_eq!(harness.generator.calls_for(PromptKind::ValidateScope), 2);
    assert_eq!(harness.generator.calls_for(PromptKind::MergeRequirements), 1);
    assert_eq!(
        report.context.scope.requirements,
        vec![
            "read the file named by the first argument".to_string(),
            "print the count followed by a newline".to_string()
        ]
    );

    let asks: Vec<String> = harness
        .generator
        .prompts()
        .into_iter()
        .filter(|p| PromptKind::from_tagged(p) == Some(PromptKind::AskUser))
        .collect();
    assert!(asks[1].contains("ask how the count is printed"));
    assert_eq!(report.logger.questions_answers().len(), 2);
}

#[tokio::test]
async fn test_failed_execution_triggers_replan() {
    let single = json!({"plan": {"create_crate": "Create a new Rust crate named wordcount"}}).to_string();
    let generator = word_counter_choosing(&["cargo_new", "cargo_new"])
        .always(PromptKind::CreatePlan, single.clone())
        .always(PromptKind::UpdatePlan, single);
    let executor = ScriptedExecutor::new().then(Execution::failure("", "destination exists"));
    let harness = Harness::new(generator).with_executor(executor);
    let report = harness.run().await;

    assert!(report.finished());
    assert_eq!(harness.executor.calls().len(), 2);
    assert_eq!(harness.generator.calls_for(PromptKind::UpdatePlan), 1);
    assert_eq!(report.logger.len(), 2);

    let first_pass = report.logger.get(0).unwrap();
    let outcome = first_pass.outcome.as_ref().unwrap();
    assert!(!outcome.is_success());
    assert_eq!(outcome.category(), Some(FailureCategory::Execution));

    // the replan carried the step over and it succeeded on the second pass
    let step = &report.context.plan.as_ref().unwrap().steps()[0];
    assert!(step.is_accomplished());
    assert!(step.feedback.as_ref().unwrap().is_success());
}

#[tokio::test]
async fn test_unlisted_tool_is_corrected() {
    let generator = word_counter_choosing(&["docker", "cargo_new", "write_file"]);
    let harness = Harness::new(generator);
    let report = harness.run().await;

    assert!(report.finished());
    let selections: Vec<String> = harness
        .generator
        .prompts()
        .into_iter()
        .filter(|p| PromptKind::from_tagged(p) == Some(PromptKind::ToolSelection))
        .collect();
    assert_eq!(selections.len(), 3);
    assert!(selections[1].contains("choose exactly one of"));
    // the local check rejected docker without asking the generator
    assert_eq!(harness.generator.calls_for(PromptKind::ValidateToolSelection), 2);
}

#[tokio::test]
async fn test_planning_budget_halts_when_no_tool_fits() {
    let plan = json!({"plan": {"deploy": "Deploy the binary to production servers"}}).to_string();
    let generator = word_counter_script()
        .always(PromptKind::CreatePlan, plan.clone())
        .always(PromptKind::UpdatePlan, plan);
    let config = SessionConfig {
        max_iterations: 2,
        ..SessionConfig::default()
    };
    let harness = Harness::new(generator).with_config(config);
    let report = harness.run().await;

    assert!(!report.finished());
    assert_eq!(halted_category(&report), Some(FailureCategory::RetryExhausted));
    assert_eq!(harness.generator.calls_for(PromptKind::ToolSelection), 0);
    assert!(harness.executor.calls().is_empty());
    let step = &report.context.plan.as_ref().unwrap().steps()[0];
    assert_eq!(
        step.feedback.as_ref().unwrap().category(),
        Some(FailureCategory::NoSuitableTool)
    );
    assert!(
        report
            .logger
            .entries()
            .any(|e| matches!(&e.kind, LogKind::CandidateTools { tools, .. } if tools.is_empty()))
    );
}

#[tokio::test]
async fn test_generator_timeout_halts() {
    let generator = word_counter_script().stall(PromptKind::RetrieveGoal);
    let config = SessionConfig {
        generator_timeout_ms: 50,
        ..SessionConfig::default()
    };
    let harness = Harness::new(generator).with_config(config);
    let report = harness.run().await;

    assert!(!report.finished());
    assert_eq!(halted_category(&report), Some(FailureCategory::Service));
    assert!(report.halted.as_ref().unwrap().message().contains("Timed out"));
}

#[tokio::test]
async fn test_cancelled_session_halts() {
    let generator = word_counter_script().stall(PromptKind::RetrieveGoal);
    let harness = Harness::new(generator);
    harness.cancel.cancel();
    let report = harness.run().await;

    assert!(!report.finished());
    assert_eq!(halted_category(&report), Some(FailureCategory::Aborted));
    assert!(harness.human.asked().is_empty());
}

#[tokio::test]
async fn test_report_carries_workflow_id() {
    let harness = Harness::new(word_counter_script());
    let report = harness.run().await;

    assert!(report.workflow_id.starts_with("wf-"));
}

#[tokio::test]
async fn test_prose_goal_verdict_is_logged_before_halting() {
    let generator = word_counter_script().reply(PromptKind::ValidateGoal, "Sorry, I cannot judge that");
    let harness = Harness::new(generator);
    let report = harness.run().await;

    assert!(!report.finished());
    assert_eq!(halted_category(&report), Some(FailureCategory::MalformedOutput));
    assert!(report.halted.as_ref().unwrap().message().contains("user_goal"));
    assert_eq!(harness.generator.calls_for(PromptKind::RetrieveGoal), 1);

    let verdict = report
        .logger
        .entries()
        .find(|e| e.is_validation_of("user_goal"))
        .expect("validator reply logged");
    match &verdict.kind {
        LogKind::Validation { response, .. } => assert_eq!(response, "Sorry, I cannot judge that"),
        other => panic!("unexpected entry {:?}", other),
    }
    assert_eq!(
        verdict.feedback.as_ref().and_then(|f| f.category()),
        Some(FailureCategory::MalformedOutput)
    );
    assert_eq!(report.visited, vec![ESTABLISH_SCOPE]);
}

#[tokio::test]
async fn test_combination_decline_triggers_replan() {
    let generator = word_counter_choosing(&[])
        .reply(
            PromptKind::ToolSelection,
            json!({"tool": null, "feedback": {"success": false, "message": "needs a combination of tools"}})
                .to_string(),
        )
        .reply(PromptKind::ToolSelection, json!({"tool": "cargo_new"}).to_string())
        .reply(PromptKind::ToolSelection, json!({"tool": "write_file"}).to_string());
    let harness = Harness::new(generator);
    let report = harness.run().await;

    assert!(report.finished(), "halted: {:?}", report.halted);
    let first_pass = report.logger.get(0).unwrap();
    assert_eq!(
        first_pass.outcome.as_ref().unwrap().category(),
        Some(FailureCategory::ToolCombinationNeeded)
    );
    // the decline never reached the selection validator or the executor
    assert_eq!(harness.generator.calls_for(PromptKind::ValidateToolSelection), 2);
    assert_eq!(harness.executor.calls().len(), 2);
    assert_eq!(harness.generator.calls_for(PromptKind::UpdatePlan), 2);
    assert_eq!(
        report.visited,
        vec![ESTABLISH_SCOPE, PLANNING, TASK_HANDLING, PLANNING, TASK_HANDLING, PLANNING, TASK_HANDLING]
    );
    let plan = report.context.plan.as_ref().unwrap();
    assert_eq!(plan.steps()[0].action.as_ref().unwrap().tool.name, "cargo_new");
}

#[tokio::test]
async fn test_update_dropping_completed_step_is_rejected_locally() {
    let partial = json!({"plan": {"write_main": "Write the word counting source file"}}).to_string();
    let generator = word_counter_script().reply(PromptKind::UpdatePlan, partial);
    let harness = Harness::new(generator);
    let report = harness.run().await;

    assert!(report.finished(), "halted: {:?}", report.halted);
    assert_eq!(harness.generator.calls_for(PromptKind::UpdatePlan), 2);
    // the first revision never reached the generator-backed validator
    assert_eq!(harness.generator.calls_for(PromptKind::ValidateUpdatePlan), 1);

    let updates: Vec<String> = harness
        .generator
        .prompts()
        .into_iter()
        .filter(|p| PromptKind::from_tagged(p) == Some(PromptKind::UpdatePlan))
        .collect();
    assert!(!updates[0].contains("keep these completed steps"));
    assert!(updates[1].contains("keep these completed steps by name: create_crate"));

    let plan = report.context.plan.as_ref().unwrap();
    assert_eq!(plan.len(), 2);
    assert!(plan.step_by_name("create_crate").unwrap().is_accomplished());
}
