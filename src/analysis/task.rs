//! The five analysis tasks
//!
//! Tasks differ only in which files they look at, what they tell the model,
//! and which object they expect back. Everything else is shared by the
//! generic [`AnalysisClient`](super::AnalysisClient).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::schema::{Field, FieldType, OutputSchema};
use crate::error::ButterflyError;

const QUALITY_SCALE: &[&str] = &["Poor", "Fair", "Good", "Excellent"];
const RISK_SCALE: &[&str] = &["Low", "Medium", "High", "Critical"];

/// One of the five fixed analysis dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisKind {
    /// Architecture and its security posture
    Architecture,
    /// Static code analysis
    Static,
    /// Code quality and maintainability
    Quality,
    /// Dependency audit
    Dependency,
    /// Performance with security considerations
    Performance,
}

impl AnalysisKind {
    /// All tasks, in execution order
    pub const ALL: [AnalysisKind; 5] = [
        AnalysisKind::Architecture,
        AnalysisKind::Static,
        AnalysisKind::Quality,
        AnalysisKind::Dependency,
        AnalysisKind::Performance,
    ];

    /// Order in which tasks appear in the consolidated summary
    pub const SUMMARY_ORDER: [AnalysisKind; 5] = [
        AnalysisKind::Architecture,
        AnalysisKind::Quality,
        AnalysisKind::Dependency,
        AnalysisKind::Performance,
        AnalysisKind::Static,
    ];

    /// Short machine name
    pub fn name(self) -> &'static str {
        match self {
            Self::Architecture => "architecture",
            Self::Static => "static",
            Self::Quality => "quality",
            Self::Dependency => "dependency",
            Self::Performance => "performance",
        }
    }

    /// Key of this task's slot in a consolidated report
    pub fn report_key(self) -> &'static str {
        match self {
            Self::Architecture => "ARCHITECTURE_ANALYSIS",
            Self::Static => "STATIC_CODE_ANALYSIS",
            Self::Quality => "CODE_QUALITY_ANALYSIS",
            Self::Dependency => "DEPENDENCY_AUDIT",
            Self::Performance => "PERFORMANCE_ANALYSIS",
        }
    }

    /// Human readable label used in summaries
    pub fn label(self) -> &'static str {
        match self {
            Self::Architecture => "Architecture",
            Self::Static => "Static",
            Self::Quality => "Code quality",
            Self::Dependency => "Dependency",
            Self::Performance => "Performance",
        }
    }

    /// Environment variable that overrides this task's system prompt
    pub fn prompt_env_var(self) -> &'static str {
        match self {
            Self::Architecture => "ARCHITECTURE_SYS_PROMPT",
            Self::Static => "STATIC_SYS_PROMPT",
            Self::Quality => "CODE_QUALITY_SYS_PROMPT",
            Self::Dependency => "DEPENDENCY_SYS_PROMPT",
            Self::Performance => "PERFORMANCE_SYS_PROMPT",
        }
    }
}

impl fmt::Display for AnalysisKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AnalysisKind {
    type Err = ButterflyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AnalysisKind::ALL
            .into_iter()
            .find(|k| k.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ButterflyError::Config(format!("unknown analysis task: {}", s)))
    }
}

/// Immutable description of one analysis task
#[derive(Debug, Clone)]
pub struct AnalysisTask {
    /// Which dimension this task covers
    pub kind: AnalysisKind,
    /// Glob allowlist; a file is analysed when any pattern matches
    pub patterns: Vec<String>,
    /// System message sent with every request
    pub system_prompt: String,
    /// Sentence that opens the user message
    pub instruction: &'static str,
    /// Structured object the model must return
    pub schema: OutputSchema,
}

impl AnalysisTask {
    /// The built-in definition of a task
    pub fn builtin(kind: AnalysisKind) -> Self {
        Self {
            kind,
            patterns: default_patterns(kind).iter().map(|p| p.to_string()).collect(),
            system_prompt: default_system_prompt(kind).to_string(),
            instruction: instruction(kind),
            schema: schema(kind),
        }
    }

    /// All five built-in tasks, in execution order
    pub fn builtin_all() -> Vec<Self> {
        AnalysisKind::ALL.into_iter().map(Self::builtin).collect()
    }

    /// Replaces the system prompt
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }
}

fn instruction(kind: AnalysisKind) -> &'static str {
    match kind {
        AnalysisKind::Architecture => "Analyze the architecture of the following codebase",
        AnalysisKind::Static => "Perform static code analysis on the following codebase",
        AnalysisKind::Quality => "Analyze the code quality of the following codebase",
        AnalysisKind::Dependency => "Analyze the dependencies of the following codebase",
        AnalysisKind::Performance => {
            "Analyze the performance and security implications of the following codebase"
        }
    }
}

fn default_system_prompt(kind: AnalysisKind) -> &'static str {
    match kind {
        AnalysisKind::Architecture => {
            "You are a senior security architect. Review the structure of the codebase, \
             how data flows between its components, and how it authenticates and authorizes \
             callers. Report concrete weaknesses and an overall architectural security risk."
        }
        AnalysisKind::Static => {
            "You are a static analysis engine. Inspect the source for syntax errors, likely \
             bugs, security vulnerabilities, code smells, unused code and anti-patterns. \
             Cite file names where possible."
        }
        AnalysisKind::Quality => {
            "You are a meticulous code reviewer. Assess readability, duplication, complexity, \
             naming, error handling, logging, tests and documentation, and score \
             maintainability from 0 to 10."
        }
        AnalysisKind::Dependency => {
            "You are a dependency auditor. From the manifests and lock files, list direct and \
             transitive dependencies, flag outdated, vulnerable, unused or problematically \
             licensed packages, and rate overall dependency health."
        }
        AnalysisKind::Performance => {
            "You are a performance engineer with a security focus. Identify algorithmic \
             inefficiencies, resource exhaustion risks, caching and database hazards, and \
             concurrency problems, and rate the overall risk."
        }
    }
}

fn default_patterns(kind: AnalysisKind) -> &'static [&'static str] {
    match kind {
        AnalysisKind::Architecture => &[
            "*.py", "*.js", "*.ts", "*.php", "*.rb", "*.java", "*.go", "*.cs",
            "*.env", "*.yml", "*.yaml", "*.json", "*.xml",
            "*.sql",
            "Dockerfile", "docker-compose.yml",
            ".gitlab-ci.yml", ".travis.yml", ".github/workflows/*.yml",
            "package.json", "requirements.txt", "Gemfile", "pom.xml",
            ".htaccess", "nginx.conf", "web.config",
            "*.swift", "*.kt",
        ],
        AnalysisKind::Static => &[
            "*.py", "*.js", "*.ts", "*.php", "*.rb", "*.java", "*.go", "*.cs",
            "*.html", "*.css", "*.scss", "*.jsx", "*.tsx",
            "*.sql",
            "Dockerfile", "docker-compose.yml",
            "*.xml", "*.json", "*.yaml", "*.yml",
            "*.c", "*.cpp", "*.h", "*.hpp",
            "*.rs", "*.scala", "*.kt", "*.swift",
            "*.sh", "*.bash", "*.ps1",
            "*.vue", "*.dart",
        ],
        AnalysisKind::Quality => &[
            "*.py", "*.js", "*.ts", "*.php", "*.rb", "*.java", "*.go", "*.cs",
            "*.html", "*.css", "*.scss", "*.jsx", "*.tsx",
            "*.sql",
            "Dockerfile", "docker-compose.yml",
            "*.xml", "*.json",
            "*.md", "*.txt",
        ],
        AnalysisKind::Dependency => &[
            "package.json", "requirements.txt", "Gemfile", "pom.xml",
            "*.csproj", "*.fsproj", "*.vbproj",
            "build.gradle", "build.sbt",
            "Cargo.toml",
            "go.mod",
            "composer.json",
            "Podfile",
            "build.gradle.kts",
            "pubspec.yaml",
            "project.clj",
            "mix.exs",
            "rebar.config",
            "environment.yml", "conda-environment.yml",
            "Pipfile",
            "pyproject.toml",
            "yarn.lock", "package-lock.json", "npm-shrinkwrap.json",
        ],
        AnalysisKind::Performance => &[
            "*.py", "*.js", "*.ts", "*.php", "*.rb", "*.java", "*.go", "*.cs",
            "*.sql",
            "Dockerfile", "docker-compose.yml",
            "package.json", "requirements.txt", "Gemfile", "pom.xml",
            ".htaccess", "nginx.conf", "web.config",
            "*.swift", "*.kt",
        ],
    }
}

fn schema(kind: AnalysisKind) -> OutputSchema {
    use FieldType::{Boolean, Enum, Integer, ObjectList, StringList};

    match kind {
        AnalysisKind::Architecture => OutputSchema {
            function_name: "report_architecture_security_analysis",
            description: "Report the security analysis of the codebase architecture",
            fields: vec![
                Field::required("overallArchitectureDescription", FieldType::String),
                Field::optional("criticalSecurityIssues", StringList),
                Field::optional("majorSecurityConcerns", StringList),
                Field::optional("dataFlowVulnerabilities", StringList),
                Field::optional("authenticationAuthorizationWeaknesses", StringList),
                Field::optional("securityAntiPatterns", StringList),
                Field::optional("scalabilitySecurityImpact", FieldType::String),
                Field::optional("thirdPartySecurityRisks", StringList),
                Field::required("overallArchitecturalSecurityRisk", Enum(RISK_SCALE)),
                Field::required("keyRecommendations", StringList),
            ],
            headline: "overallArchitecturalSecurityRisk",
            recommendations: "keyRecommendations",
        },
        AnalysisKind::Static => OutputSchema {
            function_name: "report_static_analysis",
            description: "Report the static code analysis results of the codebase",
            fields: vec![
                Field::optional("syntaxErrors", StringList),
                Field::optional("potentialBugs", StringList),
                Field::optional("securityVulnerabilities", StringList),
                Field::optional("codeSmells", StringList),
                Field::optional("styleViolations", StringList),
                Field::optional("unusedCode", StringList),
                Field::optional("complexityIssues", StringList),
                Field::optional("potentialRuntimeErrors", StringList),
                Field::optional("antiPatterns", StringList),
                Field::required("overallCodeHealth", Enum(QUALITY_SCALE)),
                Field::required("keyRecommendations", StringList),
            ],
            headline: "overallCodeHealth",
            recommendations: "keyRecommendations",
        },
        AnalysisKind::Quality => OutputSchema {
            function_name: "report_code_quality_analysis",
            description: "Report the code quality analysis of the codebase",
            fields: vec![
                Field::required("readabilityAssessment", FieldType::String),
                Field::optional("codeDuplicationIssues", StringList),
                Field::optional("complexityIssues", StringList),
                Field::optional("namingConventionViolations", StringList),
                Field::optional("errorHandlingAssessment", FieldType::String),
                Field::optional("loggingPractices", FieldType::String),
                Field::optional("testCoverageAssessment", FieldType::String),
                Field::optional("codeOrganization", FieldType::String),
                Field::optional("commentQuality", FieldType::String),
                Field::optional("solidPrincipleAdherence", FieldType::String),
                Field::optional("securityBestPractices", FieldType::String),
                Field::optional("performanceConsiderations", StringList),
                Field::required(
                    "maintainabilityScore",
                    FieldType::Number { min: Some(0.0), max: Some(10.0) },
                ),
                Field::required("overallCodeQualityAssessment", Enum(QUALITY_SCALE)),
                Field::required("keyRecommendations", StringList),
            ],
            headline: "overallCodeQualityAssessment",
            recommendations: "keyRecommendations",
        },
        AnalysisKind::Dependency => OutputSchema {
            function_name: "report_dependency_analysis",
            description: "Report the dependency analysis of the codebase",
            fields: vec![
                Field::required(
                    "directDependencies",
                    ObjectList(vec![
                        Field::optional("name", FieldType::String),
                        Field::optional("version", FieldType::String),
                        Field::optional("latestVersion", FieldType::String),
                        Field::optional("isOutdated", Boolean),
                        Field::optional("securityVulnerabilities", StringList),
                        Field::optional("license", FieldType::String),
                        Field::optional("usageLocations", StringList),
                    ]),
                ),
                Field::optional(
                    "transitiveDependencies",
                    ObjectList(vec![
                        Field::optional("name", FieldType::String),
                        Field::optional("version", FieldType::String),
                        Field::optional("parentDependencies", StringList),
                        Field::optional("securityVulnerabilities", StringList),
                    ]),
                ),
                Field::optional("dependencyGraphComplexity", FieldType::String),
                Field::optional("outdatedDependenciesCount", Integer),
                Field::optional("vulnerableDependenciesCount", Integer),
                Field::optional("licensingIssues", StringList),
                Field::optional("unusedDependencies", StringList),
                Field::required("overallDependencyHealth", Enum(QUALITY_SCALE)),
                Field::required("keyRecommendations", StringList),
            ],
            headline: "overallDependencyHealth",
            recommendations: "keyRecommendations",
        },
        AnalysisKind::Performance => OutputSchema {
            function_name: "report_performance_security_analysis",
            description: "Report the performance analysis of the codebase with security considerations",
            fields: vec![
                Field::optional("algorithmicEfficiencyIssues", StringList),
                Field::optional("resourceUtilizationVulnerabilities", StringList),
                Field::optional("cachingSecurityImplications", StringList),
                Field::optional("databasePerformanceRisks", StringList),
                Field::optional("asynchronousOperationConcerns", StringList),
                Field::optional("loadHandlingSecurityImpact", FieldType::String),
                Field::optional("thirdPartyPerformanceSecurityRisks", StringList),
                Field::optional("criticalPerformanceSecurityIssues", StringList),
                Field::required("overallPerformanceSecurityRisk", Enum(RISK_SCALE)),
                Field::required("keyRecommendations", StringList),
            ],
            headline: "overallPerformanceSecurityRisk",
            recommendations: "keyRecommendations",
        },
    }
}
