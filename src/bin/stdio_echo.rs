/*!
 * stdio-echo
 * Child program driven by the process-handle tests
 *
 * `stdio-echo N`: writes N to stdout once and to stderr twice, exits with N.
 * `stdio-echo 64`: same, but echoes the first whitespace-trimmed line of
 *     stdin instead of N.
 * `stdio-echo drain`: reads stdin to end-of-file, echoes it to stdout
 *     unchanged, exits 0.
 */

use std::io::{self, BufRead, Read, Write};
use std::process::ExitCode;

fn main() -> ExitCode {
    let arg = std::env::args().nth(1).unwrap_or_else(|| "0".to_string());

    if arg == "drain" {
        let mut input = Vec::new();
        if io::stdin().read_to_end(&mut input).is_err() {
            return ExitCode::FAILURE;
        }
        let mut stdout = io::stdout();
        let _ = stdout.write_all(&input);
        let _ = stdout.flush();
        return ExitCode::SUCCESS;
    }

    let code: u8 = match arg.parse() {
        Ok(code) => code,
        Err(_) => return ExitCode::from(255),
    };

    let text = if code == 64 {
        let mut line = String::new();
        let _ = io::stdin().lock().read_line(&mut line);
        line.trim().to_string()
    } else {
        arg
    };

    let mut stdout = io::stdout();
    let _ = write!(stdout, "{}", text);
    let _ = stdout.flush();

    let mut stderr = io::stderr();
    let _ = write!(stderr, "{}{}", text, text);
    let _ = stderr.flush();

    ExitCode::from(code)
}
