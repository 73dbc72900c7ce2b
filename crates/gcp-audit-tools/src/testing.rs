//! Scripted command runner for exercising tools without a cloud account

use std::sync::{Mutex, PoisonError};

use crate::{CommandOutput, CommandRunner, Program, ToolError};

#[derive(Debug, Clone)]
enum Reply {
    Output(CommandOutput),
    Missing,
}

#[derive(Debug, Clone)]
struct Rule {
    program: Program,
    needle: String,
    reply: Reply,
}

/// Answers invocations from canned replies
///
/// A rule matches when the program is the same and the space-joined
/// arguments contain its needle. Rules are tried in insertion order; an
/// invocation nothing matches exits 127.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    rules: Vec<Rule>,
    calls: Mutex<Vec<(Program, Vec<String>)>>,
}

impl ScriptedRunner {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Succeed with `stdout`
    #[must_use]
    pub fn respond(self, program: Program, needle: &str, stdout: &str) -> Self {
        self.rule(program, needle, Reply::Output(CommandOutput::success(stdout)))
    }

    /// Exit with `code` and `stderr`
    #[must_use]
    pub fn fail(self, program: Program, needle: &str, code: i32, stderr: &str) -> Self {
        self.rule(program, needle, Reply::Output(CommandOutput::failure(code, stderr)))
    }

    /// Behave as if the binary were not installed
    #[must_use]
    pub fn missing(self, program: Program) -> Self {
        self.rule(program, "", Reply::Missing)
    }

    fn rule(mut self, program: Program, needle: &str, reply: Reply) -> Self {
        self.rules.push(Rule {
            program,
            needle: needle.to_string(),
            reply,
        });
        self
    }

    /// Every invocation seen so far
    #[must_use]
    pub fn calls(&self) -> Vec<(Program, Vec<String>)> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, program: Program, args: &[String]) -> Result<CommandOutput, ToolError> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((program, args.to_vec()));

        let joined = args.join(" ");
        let rule = self
            .rules
            .iter()
            .find(|rule| rule.program == program && joined.contains(&rule.needle));

        match rule.map(|rule| &rule.reply) {
            Some(Reply::Output(output)) => Ok(output.clone()),
            Some(Reply::Missing) => Err(ToolError::Spawn {
                program: program.name().to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "No such file or directory"),
            }),
            None => Ok(CommandOutput::failure(
                127,
                format!("no scripted reply for {} {joined}", program.name()),
            )),
        }
    }
}
