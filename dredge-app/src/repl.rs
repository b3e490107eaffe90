//! The interactive command loop.

use crate::command::{parse_command, Command};
use anyhow::Result;
use dredge_browser::Session;
use dredge_config::DredgeConfig;
use dredge_export::{export, resolve_export_path, ExportFormat};
use dredge_http::{ApiClient, LastResponse};
use dredge_process::analyze_page;
use dredge_scraper::{Controller, ScrapeError, SolvePass};
use dredge_store::Store;
use std::io::Write as _;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::error;

const PREVIEW_CHARS: usize = 100;
const API_PREVIEW_CHARS: usize = 300;

const HELP: &str = "\
Available commands:

Scraper:
  navigate <url>                navigate to a URL (auto-solves CAPTCHAs)
  click <css-selector>          click an element (auto-solves CAPTCHAs)
  get_html                      fetch and record the page source
  get_text <css-selector>       fetch and record an element's text
  login <url> <user> <pass>     best-effort login flow
  save <csv|json|xml|db> [name] export or persist collected data
  analyze [url]                 store an analysis document for a page
  status                        show collected data
  clear                         drop all collected data

API client:
  api_get <url>                 GET request
  api_post <url> <json>         POST request with a JSON body
  api_auth_basic <user> <pass>  set basic authentication
  api_auth_token <token>        set a bearer token
  api_header <name> <value>     set a default header
  api_save [filename]           save the last response to a file
  api_info                      show the last response

Other:
  help                          this text
  exit / quit                   leave";

pub struct Repl<S: Session> {
    controller: Controller<S>,
    api: ApiClient,
    store: Store,
    config: DredgeConfig,
}

impl<S: Session> Repl<S> {
    pub fn new(
        controller: Controller<S>,
        api: ApiClient,
        store: Store,
        config: DredgeConfig,
    ) -> Self {
        Self {
            controller,
            api,
            store,
            config,
        }
    }

    pub fn into_controller(self) -> Controller<S> {
        self.controller
    }

    /// Read commands from stdin until `exit`/`quit` or EOF. Returns early
    /// only when the browser session becomes unusable.
    pub async fn run(&mut self) -> Result<()> {
        println!("Welcome to dredge. Type 'help' for available commands.");
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        loop {
            print!("dredge> ");
            std::io::stdout().flush()?;

            let Some(line) = lines.next_line().await? else {
                break;
            };
            match parse_command(&line) {
                Command::Quit => {
                    println!("Goodbye!");
                    break;
                }
                command => self.dispatch(command).await?,
            }
        }
        Ok(())
    }

    /// Execute one command. `Err` only for fatal session loss; every other
    /// failure is printed and the loop continues.
    pub async fn dispatch(&mut self, command: Command) -> Result<()> {
        match command {
            Command::Navigate(url) => match self.controller.navigate(&url).await {
                Ok(pass) => {
                    report_pass(&pass);
                    println!("Navigation to {url} completed.");
                }
                Err(e) => self.report(e)?,
            },
            Command::Click(selector) => match self.controller.click(&selector).await {
                Ok(pass) => {
                    report_pass(&pass);
                    println!("Clicked element: {selector}");
                }
                Err(e) => self.report(e)?,
            },
            Command::GetHtml => match self.controller.get_html().await {
                Ok(html) => {
                    println!("HTML retrieved ({} bytes):", html.len());
                    println!("{}", preview(&html, PREVIEW_CHARS));
                }
                Err(e) => self.report(e)?,
            },
            Command::GetText(selector) => match self.controller.get_text(&selector).await {
                Ok(text) => {
                    println!("Text from {selector}:");
                    println!("{}", preview(&text, PREVIEW_CHARS));
                }
                Err(e) => self.report(e)?,
            },
            Command::Login {
                url,
                username,
                password,
            } => match self.controller.login(&url, &username, &password).await {
                Ok(report) => {
                    println!(
                        "Login flow finished (pre-submit: {}, post-submit: {}, submitted: {})",
                        report.pre_submit, report.post_submit, report.submitted
                    );
                }
                Err(e) => self.report(e)?,
            },
            Command::Save { format, filename } => self.save(&format, filename.as_deref()).await,
            Command::Status => {
                let records = self.controller.records();
                if records.is_empty() {
                    println!("No scraped data.");
                } else {
                    println!("Scraped pages:");
                    for record in records {
                        println!("  {}", record.summary());
                    }
                }
            }
            Command::Clear => {
                self.controller.clear();
                println!("Cleared all collected data.");
            }
            Command::Analyze(url) => self.analyze(url).await,
            Command::ApiGet(url) => match self.api.get(&url).await {
                Ok(response) => print_api_response(&response),
                Err(e) => println!("API error: {e}"),
            },
            Command::ApiPost { url, body } => match serde_json::from_str(&body) {
                Ok(value) => match self.api.post_json(&url, value).await {
                    Ok(response) => print_api_response(&response),
                    Err(e) => println!("API error: {e}"),
                },
                Err(e) => println!("Invalid JSON body: {e}"),
            },
            Command::ApiAuthBasic { username, password } => {
                self.api.set_auth_basic(&username, &password);
                println!("Basic authentication set.");
            }
            Command::ApiAuthToken(token) => match self.api.set_auth_token(&token) {
                Ok(()) => println!("Bearer token set."),
                Err(e) => println!("error: {e}"),
            },
            Command::ApiHeader { name, value } => match self.api.set_header(&name, &value) {
                Ok(()) => println!("Header {name} set."),
                Err(e) => println!("error: {e}"),
            },
            Command::ApiSave(filename) => {
                match self
                    .api
                    .save_last(&self.config.export.api_directory, filename.as_deref())
                    .await
                {
                    Ok(path) => println!("Response saved to: {}", path.display()),
                    Err(e) => println!("error: {e}"),
                }
            }
            Command::ApiInfo => match self.api.last() {
                Some(last) => println!("{}", last.describe()),
                None => println!("No API response yet."),
            },
            Command::Help => println!("{HELP}"),
            Command::Usage(usage) => println!("usage: {usage}"),
            Command::Unknown(input) => {
                println!("Unknown command: {input}. Type 'help' for available commands.")
            }
            Command::Empty | Command::Quit => {}
        }
        Ok(())
    }

    async fn save(&mut self, format: &str, filename: Option<&str>) {
        let records = self.controller.records();
        if records.is_empty() {
            println!("No data to save; scrape something first.");
            return;
        }

        if format == "db" {
            let mut saved = 0usize;
            for record in &records {
                match self.store.save_record(record).await {
                    Ok(_) => saved += 1,
                    Err(e) => {
                        println!("Database error after {saved} rows: {e}");
                        return;
                    }
                }
            }
            match self.store.record_count().await {
                Ok(total) => println!("Saved {saved} records to the database ({total} rows total)."),
                Err(_) => println!("Saved {saved} records to the database."),
            }
            return;
        }

        match format.parse::<ExportFormat>() {
            Ok(fmt) => {
                let path = resolve_export_path(&self.config.export.directory, filename, fmt);
                match export(&records, &path, fmt) {
                    Ok(()) => println!("Data saved to: {}", path.display()),
                    Err(e) => println!("Export error: {e}"),
                }
            }
            Err(msg) => println!("{msg}; available formats: csv, json, xml, db"),
        }
    }

    async fn analyze(&mut self, url: Option<String>) {
        let Some(url) = url.or_else(|| self.controller.current_url().map(str::to_string)) else {
            println!("First navigate to a page using 'navigate'.");
            return;
        };
        let Some(page) = self.controller.page(&url) else {
            println!("No data for {url}; navigate there first.");
            return;
        };
        let Some(html) = page.html.clone() else {
            println!("No HTML captured for {url}; run get_html first.");
            return;
        };

        let analysis = analyze_page(&url, &html, &page.texts);
        match self.store.save_document(&url, &analysis.to_document()).await {
            Ok(id) => println!(
                "Analysis stored with id {id} ({} words, {} text elements)",
                analysis.word_count,
                analysis.text_elements.len()
            ),
            Err(e) => println!("Database error: {e}"),
        }
    }

    /// Print recoverable scrape errors; propagate only fatal session loss.
    fn report(&self, e: ScrapeError) -> Result<()> {
        match &e {
            ScrapeError::Session(s) if s.is_fatal() => {
                error!(error = %e, "repl.session_lost");
                Err(e.into())
            }
            _ => {
                println!("error: {e}");
                Ok(())
            }
        }
    }
}

fn report_pass(pass: &SolvePass) {
    match pass {
        SolvePass::Solved | SolvePass::Unsolved(_) => println!("{pass}"),
        SolvePass::Clear | SolvePass::Skipped => {}
    }
}

fn print_api_response(response: &LastResponse) {
    println!("status: {}", response.status);
    println!(
        "content-type: {}",
        response.content_type.as_deref().unwrap_or("-")
    );
    match response.json() {
        Ok(serde_json::Value::Array(items)) => {
            println!("objects: {}", items.len());
            if let Some(first) = items.first() {
                let pretty =
                    serde_json::to_string_pretty(first).unwrap_or_else(|_| first.to_string());
                println!("sample object:");
                println!("{}", preview(&pretty, API_PREVIEW_CHARS));
            }
        }
        Ok(value) => {
            let pretty = serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string());
            println!("{}", preview(&pretty, API_PREVIEW_CHARS));
        }
        Err(_) => println!("{}", preview(&response.body, API_PREVIEW_CHARS)),
    }
}

fn preview(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{truncated}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_truncates_on_char_boundaries() {
        assert_eq!(preview("short", 100), "short");
        let long = "é".repeat(150);
        let p = preview(&long, 100);
        assert!(p.ends_with("..."));
        assert_eq!(p.chars().count(), 103);
    }
}
