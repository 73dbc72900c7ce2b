//! Interactive chat with Gemini

use std::io::{self, BufRead, Write};

use crate::GeminiClient;

const RULE_WIDTH: usize = 60;

fn is_quit(line: &str) -> bool {
    matches!(line.to_lowercase().as_str(), "exit" | "quit" | "q")
}

/// Prompt-response loop until a quit word or end of input
///
/// Each line is sent as a single-turn prompt. A failed turn prints the error
/// and the loop continues.
///
/// # Errors
///
/// Returns an I/O error only when reading `input` or writing `output` fails.
/// A line that is not UTF-8 counts as a failed turn.
pub async fn run_chat<R: BufRead, W: Write>(
    client: &GeminiClient,
    project: &str,
    region: &str,
    mut input: R,
    output: &mut W,
) -> io::Result<()> {
    let rule = "=".repeat(RULE_WIDTH);
    writeln!(output, "{rule}")?;
    writeln!(output, "GEMINI CHAT - READY TO USE")?;
    writeln!(output, "{rule}")?;
    writeln!(output, "\n✓ Using: {} via {}", client.model(), client.backend().label())?;
    writeln!(output, "✓ Project: {project}")?;
    writeln!(output, "✓ Region: {region}")?;
    writeln!(output, "\nType 'exit' to quit")?;

    let mut buf = Vec::new();
    loop {
        write!(output, "\n🤖 You: ")?;
        output.flush()?;

        buf.clear();
        if input.read_until(b'\n', &mut buf)? == 0 {
            writeln!(output, "\n\n👋 Goodbye!")?;
            return Ok(());
        }

        let Ok(line) = std::str::from_utf8(&buf) else {
            writeln!(output, "\n❌ Error: input is not valid UTF-8")?;
            continue;
        };
        let prompt = line.trim();
        if is_quit(prompt) {
            writeln!(output, "\n👋 Goodbye!")?;
            return Ok(());
        }
        if prompt.is_empty() {
            continue;
        }

        match client.generate_text(prompt).await {
            Ok(text) => writeln!(output, "\n💭 Gemini: {text}")?,
            Err(e) => writeln!(output, "\n❌ Error: {e}")?,
        }
    }
}
