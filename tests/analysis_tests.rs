use std::path::Path;
use std::sync::Arc;

use butterfly::analysis::{
    AnalysisKind, AnalysisTask, FileSelector, ProjectHealth, ReportAggregator, SelectionLimits,
};
use butterfly::error::ButterflyError;
use pretty_assertions::assert_eq;

mod common;
use common::test_helpers::*;

fn file_names(selector: &FileSelector, root: &Path, kind: AnalysisKind) -> Vec<String> {
    let task = AnalysisTask::builtin(kind);
    let mut names: Vec<String> = selector
        .select(root, &task.patterns)
        .unwrap()
        .into_iter()
        .map(|r| r.path.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[test]
fn test_each_task_selects_its_own_files() {
    let project = create_test_project();
    let selector = FileSelector::default();

    assert_eq!(file_names(&selector, project.path(), AnalysisKind::Architecture), vec!["app.py"]);
    assert_eq!(
        file_names(&selector, project.path(), AnalysisKind::Quality),
        vec!["README.md", "app.py"]
    );
    assert!(file_names(&selector, project.path(), AnalysisKind::Dependency).is_empty());
}

#[test]
fn test_ignored_directories_are_not_walked() {
    let project = create_test_project();
    write_file(project.path(), "node_modules/left-pad/index.js", "module.exports = 1;");
    write_file(project.path(), ".git/hooks/pre-commit.py", "print('hook')");
    write_file(project.path(), "src/views.py", "def view(): pass");

    let names = file_names(&FileSelector::default(), project.path(), AnalysisKind::Static);
    assert_eq!(names, vec!["app.py", "views.py"]);
}

#[test]
fn test_byte_cap_stops_selection() {
    let project = create_test_project();
    for i in 0..5 {
        write_file(project.path(), &format!("mod_{}.py", i), &"x = 1\n".repeat(100));
    }
    let selector = FileSelector::new(SelectionLimits {
        max_total_bytes: Some(500),
        ..SelectionLimits::default()
    });

    let records = selector
        .select(project.path(), &AnalysisTask::builtin(AnalysisKind::Static).patterns)
        .unwrap();
    assert!(records.len() < 6);
    assert!(!records.is_empty());
}

#[tokio::test]
async fn test_full_run_produces_consolidated_report() {
    setup_test_logger();
    let project = create_test_project();
    let service = Arc::new(FakeCompletionService::new());
    let aggregator = ReportAggregator::from_tasks(
        AnalysisTask::builtin_all(),
        service.clone(),
        FileSelector::default(),
    );

    let report = aggregator.run(project.path()).await.unwrap();

    assert_eq!(report.health(), ProjectHealth::Critical);
    assert_eq!(
        report.summary(),
        "Architecture risk: Medium. Code quality: Fair. Dependency health: Poor. \
         Performance risk: Low. Static code health: Good."
    );
    assert_eq!(
        report.action_items(),
        &["Pin versions", "Add auth", "Add tests", "Cache lookups", "Remove dead code"]
    );
    assert_eq!(report.succeeded(), 5);
    assert_eq!(service.requests().len(), 5);

    let architecture = service.request_for(AnalysisKind::Architecture).unwrap();
    assert!(architecture.user.contains("app.py"));
    assert!(!architecture.user.contains("README.md"));
    let quality = service.request_for(AnalysisKind::Quality).unwrap();
    assert!(quality.user.contains("README.md"));
}

#[tokio::test]
async fn test_one_failing_task_leaves_the_rest_intact() {
    let project = create_test_project();
    let service = Arc::new(FakeCompletionService::new().failing(AnalysisKind::Performance));
    let aggregator =
        ReportAggregator::from_tasks(AnalysisTask::builtin_all(), service, FileSelector::default());

    let report = aggregator.run(project.path()).await.unwrap();

    assert!(report.analysis(AnalysisKind::Performance).is_none());
    assert!(report
        .failure(AnalysisKind::Performance)
        .unwrap()
        .contains("upstream unavailable"));
    assert!(report.summary().contains("Performance analysis unavailable."));
    assert!(!report.action_items().iter().any(|i| i == "Cache lookups"));
    assert_eq!(report.succeeded(), 4);

    let json = serde_json::to_value(&report).unwrap();
    assert!(json["analyses"]["PERFORMANCE_ANALYSIS"].is_null());
    assert_eq!(json["analyses"]["DEPENDENCY_AUDIT"]["overallDependencyHealth"], "Poor");
    assert_eq!(json["overallProjectHealth"], "Critical");
}

#[tokio::test]
async fn test_missing_root_fails_the_run() {
    let service = Arc::new(FakeCompletionService::new());
    let aggregator = ReportAggregator::from_tasks(
        AnalysisTask::builtin_all(),
        service.clone(),
        FileSelector::default(),
    );

    let err = aggregator
        .run(Path::new("/definitely/not/a/project"))
        .await
        .unwrap_err();

    assert!(matches!(err, ButterflyError::Selection(_)));
    assert!(service.requests().is_empty());
}

#[tokio::test]
async fn test_repeated_runs_are_identical() {
    let project = create_test_project();
    let aggregator = ReportAggregator::from_tasks(
        AnalysisTask::builtin_all(),
        Arc::new(FakeCompletionService::new()),
        FileSelector::default(),
    )
    .with_max_concurrent(2);

    let first = aggregator.run(project.path()).await.unwrap();
    let second = aggregator.run(project.path()).await.unwrap();

    assert_eq!(first.to_json_pretty().unwrap(), second.to_json_pretty().unwrap());
}
