// THEORY:
// The `input` module is the interactive gate in front of the engine. Every
// operator answer is validated against an anchored pattern and re-prompted
// until it matches, so by the time the pipeline is constructed its
// configuration is known-good. Nothing in the core ever validates input —
// that all happens here, before any processing starts.

use std::io::{self, BufRead, Write};

use regex::Regex;

/// Prompts on stdout and reads stdin lines until one matches `pattern`
/// (anchored to the full line). `complaint` is printed after every rejected
/// answer.
pub fn prompt_matching(prompt: &str, pattern: &str, complaint: &str) -> io::Result<String> {
    let stdin = io::stdin();
    read_matching(&mut stdin.lock(), &mut io::stdout(), prompt, pattern, complaint)
}

fn read_matching<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    prompt: &str,
    pattern: &str,
    complaint: &str,
) -> io::Result<String> {
    let matcher = Regex::new(&format!("^(?:{pattern})$"))
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))?;

    loop {
        write!(output, "{prompt}")?;
        output.flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "input closed before a valid answer",
            ));
        }

        let answer = line.trim();
        if matcher.is_match(answer) {
            return Ok(answer.to_string());
        }
        writeln!(output, "{complaint}")?;
    }
}
