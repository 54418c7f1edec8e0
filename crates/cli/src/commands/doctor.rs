use pollbot_core::config::{AppConfig, LoadOptions};
use pollbot_db::{connect_with_settings, migrations};
use serde::Serialize;

use crate::commands::{runtime, CommandResult, EXIT_CONFIG, EXIT_DATABASE, EXIT_MIGRATION};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

impl DoctorCheck {
    fn pass(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Pass, details: details.into() }
    }

    fn fail(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Fail, details: details.into() }
    }

    fn skipped(name: &'static str, reason: &str) -> Self {
        Self { name, status: CheckStatus::Skipped, details: format!("skipped because {reason}") }
    }
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

impl DoctorReport {
    fn from_checks(checks: Vec<DoctorCheck>) -> Self {
        let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
        let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
        let summary = if all_pass {
            "doctor: all readiness checks passed".to_string()
        } else {
            "doctor: one or more readiness checks failed".to_string()
        };

        Self { overall_status, summary, checks }
    }

    /// The first failing check decides the exit code.
    fn exit_code(&self) -> u8 {
        let failed = self.checks.iter().find(|check| check.status == CheckStatus::Fail);
        match failed.map(|check| check.name) {
            None => 0,
            Some(CONFIG_VALIDATION) => EXIT_CONFIG,
            Some(MIGRATION_STATUS) => EXIT_MIGRATION,
            Some(_) => EXIT_DATABASE,
        }
    }
}

const CONFIG_VALIDATION: &str = "config_validation";
const TOKEN_POLICY: &str = "token_policy";
const DATABASE_CONNECTIVITY: &str = "database_connectivity";
const MIGRATION_STATUS: &str = "migration_status";

pub fn run(json_output: bool) -> CommandResult {
    run_with_options(LoadOptions::default(), json_output)
}

pub fn run_with_options(options: LoadOptions, json_output: bool) -> CommandResult {
    let report = build_report(options);
    let exit_code = report.exit_code();

    if json_output {
        let output = serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
        return CommandResult::text(exit_code, output);
    }

    CommandResult::text(exit_code, render_human(&report))
}

fn build_report(options: LoadOptions) -> DoctorReport {
    let config = match AppConfig::load(options) {
        Ok(config) => config,
        Err(error) => {
            let reason = "configuration did not load";
            return DoctorReport::from_checks(vec![
                DoctorCheck::fail(CONFIG_VALIDATION, error.to_string()),
                DoctorCheck::skipped(TOKEN_POLICY, reason),
                DoctorCheck::skipped(DATABASE_CONNECTIVITY, reason),
                DoctorCheck::skipped(MIGRATION_STATUS, reason),
            ]);
        }
    };

    let mut checks = vec![
        DoctorCheck::pass(CONFIG_VALIDATION, "configuration loaded and validated"),
        check_token_policy(&config),
    ];
    checks.extend(check_database(&config));
    DoctorReport::from_checks(checks)
}

fn check_token_policy(config: &AppConfig) -> DoctorCheck {
    match config.mattermost.tokens.len() {
        0 => DoctorCheck::pass(
            TOKEN_POLICY,
            "no tokens configured; slash commands are accepted without verification",
        ),
        count => DoctorCheck::pass(TOKEN_POLICY, format!("{count} slash-command token(s) accepted")),
    }
}

fn check_database(config: &AppConfig) -> Vec<DoctorCheck> {
    let runtime = match runtime() {
        Ok(runtime) => runtime,
        Err(error) => {
            return vec![
                DoctorCheck::fail(
                    DATABASE_CONNECTIVITY,
                    format!("failed to initialize async runtime: {error}"),
                ),
                DoctorCheck::skipped(MIGRATION_STATUS, "the async runtime did not start"),
            ];
        }
    };

    runtime.block_on(async {
        let pool = match connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        {
            Ok(pool) => pool,
            Err(error) => {
                return vec![
                    DoctorCheck::fail(
                        DATABASE_CONNECTIVITY,
                        format!("failed to connect to database: {error}"),
                    ),
                    DoctorCheck::skipped(MIGRATION_STATUS, "the database is unreachable"),
                ];
            }
        };

        let connectivity = DoctorCheck::pass(
            DATABASE_CONNECTIVITY,
            format!("connected using `{}`", config.database.url),
        );
        let known = migrations::known_count();
        let schema = match migrations::applied_count(&pool).await {
            Ok(applied) if applied >= known => {
                DoctorCheck::pass(MIGRATION_STATUS, format!("{applied} of {known} migrations applied"))
            }
            Ok(applied) => DoctorCheck::fail(
                MIGRATION_STATUS,
                format!("{applied} of {known} migrations applied; run `pollbot migrate`"),
            ),
            Err(error) => {
                DoctorCheck::fail(MIGRATION_STATUS, format!("failed to read migration ledger: {error}"))
            }
        };

        pool.close().await;
        vec![connectivity, schema]
    })
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::{CheckStatus, DoctorCheck, DoctorReport};

    #[test]
    fn exit_code_follows_the_first_failure() {
        let healthy = DoctorReport::from_checks(vec![DoctorCheck::pass("config_validation", "ok")]);
        assert_eq!(healthy.exit_code(), 0);
        assert_eq!(healthy.overall_status, CheckStatus::Pass);

        let stale = DoctorReport::from_checks(vec![
            DoctorCheck::pass("config_validation", "ok"),
            DoctorCheck::pass("database_connectivity", "ok"),
            DoctorCheck::fail("migration_status", "0 of 1"),
        ]);
        assert_eq!(stale.exit_code(), 5);

        let broken = DoctorReport::from_checks(vec![
            DoctorCheck::fail("config_validation", "bad url"),
            DoctorCheck::skipped("database_connectivity", "configuration did not load"),
        ]);
        assert_eq!(broken.exit_code(), 2);
        assert_eq!(broken.overall_status, CheckStatus::Fail);
    }
}
