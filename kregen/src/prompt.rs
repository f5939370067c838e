use std::{
    collections::VecDeque,
    io::{self, BufRead as _, Write as _},
};

use crate::{Error, Result};

/// Source of interactive answers during a run.
pub trait Prompter: Send {
    /// Only an explicit `yes` counts as confirmation.
    fn confirm(&mut self, question: &str) -> Result<bool>;

    /// Returns `None` when the answer is empty.
    fn ask(&mut self, question: &str) -> Result<Option<String>>;
}

fn is_affirmative(answer: &str) -> bool {
    answer.trim().eq_ignore_ascii_case("yes")
}

fn non_empty(answer: &str) -> Option<String> {
    let answer = answer.trim();
    (!answer.is_empty()).then(|| answer.to_string())
}

/// Asks on stderr and reads a line from stdin.
#[derive(Debug, Default)]
pub struct Terminal;

impl Terminal {
    fn read_line(question: &str) -> Result<String> {
        let prompt_err = |err: io::Error| Error::InvalidArguments(format!("reading answer: {err}"));
        let mut stderr = io::stderr().lock();
        write!(stderr, "{question} ").map_err(prompt_err)?;
        stderr.flush().map_err(prompt_err)?;

        let mut answer = String::new();
        io::stdin().lock().read_line(&mut answer).map_err(prompt_err)?;
        Ok(answer)
    }
}

impl Prompter for Terminal {
    fn confirm(&mut self, question: &str) -> Result<bool> {
        Ok(is_affirmative(&Self::read_line(&format!("{question} (yes/no)"))?))
    }

    fn ask(&mut self, question: &str) -> Result<Option<String>> {
        Ok(non_empty(&Self::read_line(question)?))
    }
}

/// Confirms everything and never supplies a value. Backs `--yes`.
#[derive(Debug, Default)]
pub struct AssumeYes;

impl Prompter for AssumeYes {
    fn confirm(&mut self, question: &str) -> Result<bool> {
        tracing::info!(question, "assuming yes");
        Ok(true)
    }

    fn ask(&mut self, _question: &str) -> Result<Option<String>> {
        Ok(None)
    }
}

/// Replays canned answers in order and records the questions asked.
#[derive(Debug, Default)]
pub struct Scripted {
    answers: VecDeque<String>,
    pub asked: Vec<String>,
}

impl Scripted {
    pub fn new<S: Into<String>>(answers: impl IntoIterator<Item = S>) -> Self {
        Self {
            answers: answers.into_iter().map(Into::into).collect(),
            asked: vec![],
        }
    }

    fn next(&mut self, question: &str) -> Result<String> {
        self.asked.push(question.to_string());
        self.answers
            .pop_front()
            .ok_or_else(|| Error::InvalidArguments(format!("no answer for `{question}`")))
    }
}

impl Prompter for Scripted {
    fn confirm(&mut self, question: &str) -> Result<bool> {
        Ok(is_affirmative(&self.next(question)?))
    }

    fn ask(&mut self, question: &str) -> Result<Option<String>> {
        Ok(non_empty(&self.next(question)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_yes_confirms() {
        let mut prompter = Scripted::new(["yes", " YES\n", "y", "no", ""]);
        let answers = (0..5)
            .map(|_| prompter.confirm("proceed?").unwrap())
            .collect::<Vec<_>>();
        assert_eq!(answers, [true, true, false, false, false]);
    }

    #[test]
    fn empty_answers_are_none() {
        let mut prompter = Scripted::new(["  ", "100Gi\n"]);
        assert_eq!(prompter.ask("size?").unwrap(), None);
        assert_eq!(prompter.ask("size?").unwrap().as_deref(), Some("100Gi"));
        assert_eq!(prompter.asked, ["size?", "size?"]);
    }

    #[test]
    fn running_out_of_answers_fails() {
        let mut prompter = Scripted::new(Vec::<String>::new());
        assert!(prompter.confirm("proceed?").is_err());
    }
}
