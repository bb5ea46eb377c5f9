//! Operator interaction.

use std::io::{self, BufRead, Write};

use async_trait::async_trait;

use crate::error::{Error, Result};

/// Shows change details to the operator and asks yes/no questions.
#[async_trait]
pub trait Prompter: Send + Sync {
    /// Display a block of change details.
    fn show(&self, details: &str);

    /// Ask a yes/no question; `false` means the operator declined.
    async fn confirm(&self, question: &str) -> Result<bool>;
}

/// Prompter reading answers from standard input.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdinPrompter;

#[async_trait]
impl Prompter for StdinPrompter {
    fn show(&self, details: &str) {
        println!("{}", indent(details));
    }

    async fn confirm(&self, question: &str) -> Result<bool> {
        let question = question.to_string();
        tokio::task::spawn_blocking(move || {
            let stdin = io::stdin();
            ask(&question, &mut stdin.lock(), &mut io::stdout())
        })
        .await
        .map_err(|e| Error::Prompt(format!("prompt task failed: {e}")))?
        .map_err(|e| Error::Prompt(format!("failed to read answer: {e}")))
    }
}

/// Indent every line of change details by five spaces.
pub fn indent(details: &str) -> String {
    details
        .lines()
        .map(|line| format!("     {line}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Ask until the answer is y/yes or n/no. End of input counts as no.
pub fn ask(question: &str, input: &mut impl BufRead, output: &mut impl Write) -> io::Result<bool> {
    loop {
        write!(output, "{question} [y/n]: ")?;
        output.flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            writeln!(output)?;
            return Ok(false);
        }

        match line.trim().to_ascii_lowercase().as_str() {
            "y" | "yes" => return Ok(true),
            "n" | "no" => return Ok(false),
            _ => writeln!(output, "Please enter y or n")?,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ask_reprompts_until_valid() {
        let mut input = io::Cursor::new("maybe\nYES\n");
        let mut output = Vec::new();

        assert!(ask("Apply?", &mut input, &mut output).unwrap());
        let output = String::from_utf8(output).unwrap();
        assert_eq!(output.matches("Apply? [y/n]: ").count(), 2);
        assert!(output.contains("Please enter y or n"));
    }

    #[test]
    fn test_ask_eof_declines() {
        let mut input = io::Cursor::new("");
        assert!(!ask("Apply?", &mut input, &mut Vec::new()).unwrap());
    }

    #[test]
    fn test_indent_prefixes_each_line() {
        assert_eq!(indent("a\nb"), "     a\n     b");
    }
}
