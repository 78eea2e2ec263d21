use super::selector::FileRecord;
use super::task::AnalysisTask;

/// System and user messages for one completion request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    /// The task's fixed instruction prompt
    pub system: String,
    /// Instruction sentence followed by the labeled file blocks
    pub user: String,
}

/// Concatenates selected files into one labeled block per file.
///
/// No truncation happens here; an oversized input surfaces as a service
/// error from the completion call.
pub fn build(task: &AnalysisTask, records: &[FileRecord]) -> Prompt {
    let body = records
        .iter()
        .map(|r| format!("File: {}\n\nContent:\n{}", r.path.display(), r.content))
        .collect::<Vec<_>>()
        .join("\n\n");

    Prompt {
        system: task.system_prompt.clone(),
        user: format!("{}:\n\n{}", task.instruction, body),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::AnalysisKind;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    #[test]
    fn test_build_labels_each_file() {
        let task = AnalysisTask::builtin(AnalysisKind::Static).with_system_prompt("be strict");
        let records = vec![
            FileRecord { path: PathBuf::from("src/a.py"), content: "a = 1".into() },
            FileRecord { path: PathBuf::from("src/b.py"), content: "b = 2".into() },
        ];

        let prompt = build(&task, &records);

        assert_eq!(prompt.system, "be strict");
        assert_eq!(
            prompt.user,
            "Perform static code analysis on the following codebase:\n\n\
             File: src/a.py\n\nContent:\na = 1\n\n\
             File: src/b.py\n\nContent:\nb = 2"
        );
    }

    #[test]
    fn test_build_with_no_files_keeps_instruction() {
        let task = AnalysisTask::builtin(AnalysisKind::Dependency);
        let prompt = build(&task, &[]);
        assert_eq!(prompt.user, "Analyze the dependencies of the following codebase:\n\n");
    }
}
