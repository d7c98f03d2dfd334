use chrono::NaiveDate;

/// A console command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Login { email: String, password: String },
    Logout,
    /// Keep the login token on disk; `None` shows the current choice.
    Remember(Option<bool>),
    /// `None` flips the current mode.
    Mode(Option<bool>),
    Search(String),
    /// Lists every directory match instead of acting on the first.
    Find(String),
    Barcode,
    Face,
    Retry,
    Status,
    /// Reopens the scan page after a navigation or session expiry.
    Back,
    Student(String),
    History {
        code: String,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    },
    Grades(String),
    AddGrade {
        code: String,
        subject: String,
        score: f64,
        max_score: f64,
    },
    Note {
        code: String,
        text: String,
    },
    Help,
    Quit,
}

/// One line of operator input.
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    Empty,
    Command(Command),
    /// Anything else; a scanner line when the barcode channel listens.
    Scan(String),
}

pub const HELP: &str = "\
commands:
  login <email> <password>      start a session
  logout                        end the session
  remember [on|off]             keep logins across restarts
  mode [on|off]                 attendance mode (no argument toggles)
  search <code or name>         manual lookup
  find <text>                   list matching students
  barcode                       toggle barcode scanning
  face                          toggle face scanning
  retry                         scan the next person (attendance mode)
  status                        show scan state
  back                          reopen the scan page
  student <code>                show a student
  history <code> [from] [to]    attendance history, dates as YYYY-MM-DD
  grades <code>                 grades and exam results
  grade <code> <subject> <score> <max>
                                add a grade
  note <code> <text>            replace a student's notes
  quit                          exit
while barcode scanning is on, any other line is read as a scanned code";

fn required(arg: Option<&str>, usage: &str) -> Result<String, String> {
    arg.map(str::to_string)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| format!("usage: {usage}"))
}

fn parse_date(raw: Option<&str>) -> Result<Option<NaiveDate>, String> {
    raw.map(|value| {
        NaiveDate::parse_from_str(value, "%Y-%m-%d")
            .map_err(|_| format!("invalid date '{value}', expected YYYY-MM-DD"))
    })
    .transpose()
}

fn parse_score(raw: Option<&str>, usage: &str) -> Result<f64, String> {
    let raw = required(raw, usage)?;
    raw.parse::<f64>()
        .ok()
        .filter(|value| value.is_finite() && *value >= 0.0)
        .ok_or_else(|| format!("invalid score '{raw}'"))
}

pub fn parse_line(line: &str) -> Result<Input, String> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(Input::Empty);
    }

    let (head, rest) = match trimmed.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim()),
        None => (trimmed, ""),
    };
    let mut args = rest.split_whitespace();

    let command = match head.to_ascii_lowercase().as_str() {
        "login" => {
            let email = required(args.next(), "login <email> <password>")?;
            let password = required(args.next(), "login <email> <password>")?;
            Command::Login { email, password }
        }
        "logout" => Command::Logout,
        "remember" => match args.next().map(str::to_ascii_lowercase).as_deref() {
            None => Command::Remember(None),
            Some("on") => Command::Remember(Some(true)),
            Some("off") => Command::Remember(Some(false)),
            Some(other) => return Err(format!("unknown choice '{other}', use on or off")),
        },
        "mode" => match args.next().map(str::to_ascii_lowercase).as_deref() {
            None => Command::Mode(None),
            Some("on" | "attendance") => Command::Mode(Some(true)),
            Some("off" | "lookup") => Command::Mode(Some(false)),
            Some(other) => return Err(format!("unknown mode '{other}', use on or off")),
        },
        "search" => Command::Search(required(Some(rest), "search <code or name>")?),
        "find" => Command::Find(required(Some(rest), "find <text>")?),
        "barcode" => Command::Barcode,
        "face" => Command::Face,
        "retry" => Command::Retry,
        "status" => Command::Status,
        "back" => Command::Back,
        "student" => Command::Student(required(args.next(), "student <code>")?),
        "history" => {
            let code = required(args.next(), "history <code> [from] [to]")?;
            let from = parse_date(args.next())?;
            let to = parse_date(args.next())?;
            if let (Some(from), Some(to)) = (from, to) {
                if from > to {
                    return Err("history range starts after it ends".into());
                }
            }
            Command::History { code, from, to }
        }
        "grades" => Command::Grades(required(args.next(), "grades <code>")?),
        "grade" => {
            const USAGE: &str = "grade <code> <subject> <score> <max>";
            let code = required(args.next(), USAGE)?;
            let subject = required(args.next(), USAGE)?;
            let score = parse_score(args.next(), USAGE)?;
            let max_score = parse_score(args.next(), USAGE)?;
            if max_score == 0.0 || score > max_score {
                return Err(format!("score {score} is not within 0..={max_score}"));
            }
            Command::AddGrade {
                code,
                subject,
                score,
                max_score,
            }
        }
        "note" => {
            let (code, text) = rest
                .split_once(char::is_whitespace)
                .map(|(code, text)| (code.to_string(), text.trim().to_string()))
                .ok_or_else(|| "usage: note <code> <text>".to_string())?;
            Command::Note { code, text }
        }
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        _ => return Ok(Input::Scan(trimmed.to_string())),
    };

    Ok(Input::Command(command))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands_with_arguments() {
        assert_eq!(
            parse_line("login Admin@School.org s3cret").unwrap(),
            Input::Command(Command::Login {
                email: "Admin@School.org".into(),
                password: "s3cret".into(),
            })
        );
        assert_eq!(
            parse_line("  search  Ahmed Bello ").unwrap(),
            Input::Command(Command::Search("Ahmed Bello".into()))
        );
        assert_eq!(
            parse_line("MODE on").unwrap(),
            Input::Command(Command::Mode(Some(true)))
        );
        assert_eq!(parse_line("mode").unwrap(), Input::Command(Command::Mode(None)));
        assert_eq!(
            parse_line("remember off").unwrap(),
            Input::Command(Command::Remember(Some(false)))
        );
        assert!(parse_line("remember maybe").is_err());
    }

    #[test]
    fn parses_history_ranges() {
        assert_eq!(
            parse_line("history STU2026001 2026-01-05 2026-02-01").unwrap(),
            Input::Command(Command::History {
                code: "STU2026001".into(),
                from: NaiveDate::from_ymd_opt(2026, 1, 5),
                to: NaiveDate::from_ymd_opt(2026, 2, 1),
            })
        );
        assert!(parse_line("history STU2026001 05/01/2026").is_err());
        assert!(parse_line("history STU2026001 2026-03-01 2026-02-01").is_err());
    }

    #[test]
    fn parses_grade_and_note() {
        assert_eq!(
            parse_line("grade STU2026001 Mathematics 18 20").unwrap(),
            Input::Command(Command::AddGrade {
                code: "STU2026001".into(),
                subject: "Mathematics".into(),
                score: 18.0,
                max_score: 20.0,
            })
        );
        assert!(parse_line("grade STU2026001 Mathematics 21 20").is_err());
        assert!(parse_line("grade STU2026001 Mathematics abc 20").is_err());
        assert_eq!(
            parse_line("note STU2026001 collected by guardian today").unwrap(),
            Input::Command(Command::Note {
                code: "STU2026001".into(),
                text: "collected by guardian today".into(),
            })
        );
        assert!(parse_line("note STU2026001").is_err());
    }

    #[test]
    fn missing_arguments_report_usage() {
        let err = parse_line("login only-email").unwrap_err();
        assert!(err.starts_with("usage: login"));
        assert!(parse_line("search").is_err());
        assert!(parse_line("find   ").is_err());
        assert!(parse_line("mode sideways").is_err());
    }

    #[test]
    fn unknown_lines_are_scanner_input() {
        assert_eq!(parse_line("").unwrap(), Input::Empty);
        assert_eq!(
            parse_line("STU2026002\r").unwrap(),
            Input::Scan("STU2026002".into())
        );
    }
}
