#![allow(dead_code)]

use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use butterfly::analysis::{AnalysisKind, CompletionRequest, CompletionService};
use butterfly::error::{ButterflyError, Result};
use serde_json::{json, Value};
use tempfile::TempDir;

pub mod test_helpers {
    use super::*;

    pub fn setup_test_logger() {
        let _ = env_logger::builder()
            .filter_level(log::LevelFilter::Debug)
            .is_test(true)
            .try_init();
    }

    pub fn write_file(root: &Path, relative: &str, content: &str) {
        let path = root.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    /// A small Flask-style project: one source file and a README
    pub fn create_test_project() -> TempDir {
        let dir = TempDir::new().unwrap();
        write_file(
            dir.path(),
            "app.py",
            "from flask import Flask\n\napp = Flask(__name__)\n\n@app.route('/')\ndef index():\n    return 'ok'\n",
        );
        write_file(dir.path(), "README.md", "# Demo\n\nA tiny web app.\n");
        dir
    }

    /// Payload a well-behaved model would return for `kind`
    pub fn sample_payload(kind: AnalysisKind) -> Value {
        match kind {
            AnalysisKind::Architecture => json!({
                "overallArchitectureDescription": "Single Flask module serving one route",
                "criticalSecurityIssues": [],
                "overallArchitecturalSecurityRisk": "Medium",
                "keyRecommendations": ["Add auth"]
            }),
            AnalysisKind::Static => json!({
                "unusedCode": ["helper() in app.py"],
                "overallCodeHealth": "Good",
                "keyRecommendations": ["Remove dead code"]
            }),
            AnalysisKind::Quality => json!({
                "readabilityAssessment": "Readable",
                "maintainabilityScore": 6.5,
                "overallCodeQualityAssessment": "Fair",
                "keyRecommendations": ["Add tests"]
            }),
            AnalysisKind::Dependency => json!({
                "directDependencies": [{ "name": "flask", "isOutdated": true }],
                "overallDependencyHealth": "Poor",
                "keyRecommendations": ["Pin versions"]
            }),
            AnalysisKind::Performance => json!({
                "overallPerformanceSecurityRisk": "Low",
                "keyRecommendations": ["Cache lookups"]
            }),
        }
    }

    /// In-process completion service that answers with [`sample_payload`]
    /// and records every request it sees
    #[derive(Default)]
    pub struct FakeCompletionService {
        failing: HashSet<AnalysisKind>,
        requests: Mutex<Vec<CompletionRequest>>,
    }

    impl FakeCompletionService {
        pub fn new() -> Self {
            Self::default()
        }

        /// Every request for `kind` fails with a service error
        pub fn failing(mut self, kind: AnalysisKind) -> Self {
            self.failing.insert(kind);
            self
        }

        pub fn requests(&self) -> Vec<CompletionRequest> {
            self.requests.lock().unwrap().clone()
        }

        pub fn request_for(&self, kind: AnalysisKind) -> Option<CompletionRequest> {
            self.requests().into_iter().find(|r| r.kind == kind)
        }
    }

    #[async_trait]
    impl CompletionService for FakeCompletionService {
        async fn complete(&self, request: &CompletionRequest) -> Result<Value> {
            self.requests.lock().unwrap().push(request.clone());
            if self.failing.contains(&request.kind) {
                return Err(ButterflyError::service(request.kind, "upstream unavailable"));
            }
            Ok(sample_payload(request.kind))
        }
    }

    /// A chat-completions response whose single tool call carries `arguments`
    pub fn chat_response(function: &str, arguments: &Value) -> String {
        json!({
            "id": "chatcmpl-test",
            "object": "chat.completion",
            "choices": [{
                "index": 0,
                "finish_reason": "tool_calls",
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {
                            "name": function,
                            "arguments": arguments.to_string()
                        }
                    }]
                }
            }]
        })
        .to_string()
    }
}
