use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// One instruction page: message above center, message below.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptPage {
    pub top: String,
    pub bottom: String,
}

/// One rating-scale question with its anchor labels.
#[derive(Debug, Clone, PartialEq)]
pub struct Question {
    pub text: String,
    pub anchors: Vec<String>,
}

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{origin}:{line}: expected 'top|bottom'")]
    BadPrompt { origin: String, line: usize },
    #[error("{origin}:{line}: expected 'question|anchor|anchor...' with at least two anchors")]
    BadQuestion { origin: String, line: usize },
    #[error("{origin}: no entries")]
    Empty { origin: String },
}

/// Parses a prompt file: one page per line, `top|bottom`. `#` comments
/// and blank lines are ignored.
pub fn parse_prompts(src: &str, origin: &str) -> Result<Vec<PromptPage>, PromptError> {
    let mut pages = Vec::new();
    for (i, raw) in src.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((top, bottom)) = line.split_once('|') else {
            return Err(PromptError::BadPrompt {
                origin: origin.to_string(),
                line: i + 1,
            });
        };
        pages.push(PromptPage {
            top: top.trim().to_string(),
            bottom: bottom.trim().to_string(),
        });
    }
    if pages.is_empty() {
        return Err(PromptError::Empty {
            origin: origin.to_string(),
        });
    }
    Ok(pages)
}

/// Parses a question file: one question per line,
/// `question|anchor|anchor...`.
pub fn parse_questions(src: &str, origin: &str) -> Result<Vec<Question>, PromptError> {
    let mut questions = Vec::new();
    for (i, raw) in src.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut fields = line.split('|').map(|f| f.trim().to_string());
        let text = fields.next().unwrap_or_default();
        let anchors: Vec<String> = fields.filter(|f| !f.is_empty()).collect();
        if text.is_empty() || anchors.len() < 2 {
            return Err(PromptError::BadQuestion {
                origin: origin.to_string(),
                line: i + 1,
            });
        }
        questions.push(Question { text, anchors });
    }
    if questions.is_empty() {
        return Err(PromptError::Empty {
            origin: origin.to_string(),
        });
    }
    Ok(questions)
}

pub fn load_prompt_file(path: &Path) -> Result<Vec<PromptPage>, PromptError> {
    let src = fs::read_to_string(path).map_err(|source| PromptError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_prompts(&src, &path.display().to_string())
}

pub fn load_question_file(path: &Path) -> Result<Vec<Question>, PromptError> {
    let src = fs::read_to_string(path).map_err(|source| PromptError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_questions(&src, &path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_pages_and_skips_comments() {
        let src = "\
# training prompts
Welcome to the task.|Press any button to continue.

You will see faces.|Rate each one.
";
        let pages = parse_prompts(src, "test").unwrap();
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].top, "Welcome to the task.");
        assert_eq!(pages[1].bottom, "Rate each one.");
    }

    #[test]
    fn prompt_without_delimiter_is_rejected() {
        let err = parse_prompts("just one field", "test").unwrap_err();
        assert!(matches!(err, PromptError::BadPrompt { line: 1, .. }));
    }

    #[test]
    fn empty_prompt_file_is_rejected() {
        let err = parse_prompts("# only comments\n", "test").unwrap_err();
        assert!(matches!(err, PromptError::Empty { .. }));
    }

    #[test]
    fn parses_questions_with_anchors() {
        let src = "How anxious does this face make you feel?|Not at all|Extremely\n\
                   How likely is a scream to follow?|Not likely|Very likely\n";
        let qs = parse_questions(src, "test").unwrap();
        assert_eq!(qs.len(), 2);
        assert_eq!(qs[0].anchors, vec!["Not at all", "Extremely"]);
        assert_eq!(qs[1].text, "How likely is a scream to follow?");
    }

    #[test]
    fn question_needs_two_anchors() {
        let err = parse_questions("How do you feel?|fine", "test").unwrap_err();
        assert!(matches!(err, PromptError::BadQuestion { line: 1, .. }));
    }

    #[test]
    fn load_reports_missing_file_with_path() {
        let err = load_prompt_file(Path::new("no/such/prompts.txt")).unwrap_err();
        match err {
            PromptError::Io { path, .. } => assert!(path.ends_with("prompts.txt")),
            other => panic!("unexpected error: {other}"),
        }
    }
}
