//! REPL command parsing.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Navigate(String),
    Click(String),
    GetHtml,
    GetText(String),
    Save {
        format: String,
        filename: Option<String>,
    },
    Status,
    Clear,
    Login {
        url: String,
        username: String,
        password: String,
    },
    Analyze(Option<String>),
    ApiGet(String),
    ApiPost {
        url: String,
        body: String,
    },
    ApiAuthBasic {
        username: String,
        password: String,
    },
    ApiAuthToken(String),
    ApiHeader {
        name: String,
        value: String,
    },
    ApiSave(Option<String>),
    ApiInfo,
    Help,
    Quit,
    Empty,
    Usage(&'static str),
    Unknown(String),
}

pub fn parse_command(input: &str) -> Command {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Command::Empty;
    }
    let mut parts = trimmed.splitn(2, char::is_whitespace);
    let verb = parts.next().unwrap_or_default().to_ascii_lowercase();
    let rest = parts.next().map(str::trim).filter(|s| !s.is_empty());

    match (verb.as_str(), rest) {
        ("navigate", Some(url)) => Command::Navigate(url.to_string()),
        ("navigate", None) => Command::Usage("navigate <url>"),
        ("click", Some(selector)) => Command::Click(selector.to_string()),
        ("click", None) => Command::Usage("click <css-selector>"),
        ("get_html", _) => Command::GetHtml,
        ("get_text", Some(selector)) => Command::GetText(selector.to_string()),
        ("get_text", None) => Command::Usage("get_text <css-selector>"),
        ("save", Some(rest)) => {
            let mut words = rest.split_whitespace();
            let format = words.next().unwrap_or_default().to_ascii_lowercase();
            let filename = words.next().map(str::to_string);
            Command::Save { format, filename }
        }
        ("save", None) => Command::Usage("save <csv|json|xml|db> [filename]"),
        ("status", _) => Command::Status,
        ("clear", _) => Command::Clear,
        ("login", Some(rest)) => {
            let words: Vec<&str> = rest.split_whitespace().collect();
            match words.as_slice() {
                [url, username, password] => Command::Login {
                    url: url.to_string(),
                    username: username.to_string(),
                    password: password.to_string(),
                },
                _ => Command::Usage("login <url> <username> <password>"),
            }
        }
        ("login", None) => Command::Usage("login <url> <username> <password>"),
        ("analyze", rest) => Command::Analyze(rest.map(str::to_string)),
        ("api_get", Some(url)) => Command::ApiGet(url.to_string()),
        ("api_get", None) => Command::Usage("api_get <url>"),
        ("api_post", Some(rest)) => {
            let mut words = rest.splitn(2, char::is_whitespace);
            match (words.next(), words.next()) {
                (Some(url), Some(body)) => Command::ApiPost {
                    url: url.to_string(),
                    body: body.trim().to_string(),
                },
                _ => Command::Usage("api_post <url> <json>"),
            }
        }
        ("api_post", None) => Command::Usage("api_post <url> <json>"),
        ("api_auth_basic", Some(rest)) => {
            let words: Vec<&str> = rest.split_whitespace().collect();
            match words.as_slice() {
                [username, password] => Command::ApiAuthBasic {
                    username: username.to_string(),
                    password: password.to_string(),
                },
                _ => Command::Usage("api_auth_basic <username> <password>"),
            }
        }
        ("api_auth_basic", None) => Command::Usage("api_auth_basic <username> <password>"),
        ("api_auth_token", Some(token)) => Command::ApiAuthToken(token.to_string()),
        ("api_auth_token", None) => Command::Usage("api_auth_token <token>"),
        ("api_header", Some(rest)) => {
            let mut words = rest.splitn(2, char::is_whitespace);
            match (words.next(), words.next()) {
                (Some(name), Some(value)) => Command::ApiHeader {
                    name: name.to_string(),
                    value: value.trim().to_string(),
                },
                _ => Command::Usage("api_header <name> <value>"),
            }
        }
        ("api_header", None) => Command::Usage("api_header <name> <value>"),
        ("api_save", rest) => Command::ApiSave(rest.map(str::to_string)),
        ("api_info", _) => Command::ApiInfo,
        ("help", _) => Command::Help,
        ("exit", _) | ("quit", _) => Command::Quit,
        _ => Command::Unknown(trimmed.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbs_are_case_insensitive() {
        assert_eq!(
            parse_command("NAVIGATE https://example.org"),
            Command::Navigate("https://example.org".to_string())
        );
        assert_eq!(parse_command("Exit"), Command::Quit);
        assert_eq!(parse_command("quit"), Command::Quit);
    }

    #[test]
    fn save_splits_format_and_filename() {
        assert_eq!(
            parse_command("save csv results"),
            Command::Save {
                format: "csv".to_string(),
                filename: Some("results".to_string())
            }
        );
        assert_eq!(
            parse_command("save JSON"),
            Command::Save {
                format: "json".to_string(),
                filename: None
            }
        );
        assert_eq!(
            parse_command("save"),
            Command::Usage("save <csv|json|xml|db> [filename]")
        );
    }

    #[test]
    fn login_requires_three_arguments() {
        assert_eq!(
            parse_command("login https://a.example alice s3cret"),
            Command::Login {
                url: "https://a.example".to_string(),
                username: "alice".to_string(),
                password: "s3cret".to_string()
            }
        );
        assert!(matches!(
            parse_command("login https://a.example alice"),
            Command::Usage(_)
        ));
    }

    #[test]
    fn api_post_keeps_the_json_body_intact() {
        assert_eq!(
            parse_command(r#"api_post https://api.example/things {"name": "widget"}"#),
            Command::ApiPost {
                url: "https://api.example/things".to_string(),
                body: r#"{"name": "widget"}"#.to_string()
            }
        );
    }

    #[test]
    fn header_values_may_contain_spaces() {
        assert_eq!(
            parse_command("api_header X-Note hello there"),
            Command::ApiHeader {
                name: "X-Note".to_string(),
                value: "hello there".to_string()
            }
        );
    }

    #[test]
    fn blank_and_unknown_input() {
        assert_eq!(parse_command("   "), Command::Empty);
        assert_eq!(
            parse_command("teleport home"),
            Command::Unknown("teleport home".to_string())
        );
        assert_eq!(parse_command("analyze"), Command::Analyze(None));
        assert_eq!(
            parse_command("analyze https://a.example"),
            Command::Analyze(Some("https://a.example".to_string()))
        );
    }
}
