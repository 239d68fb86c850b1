use anyhow::{Context, Result};
use clap::{value_parser, Arg, ArgAction, Command, ValueEnum};
use env_logger::Env;
use log::info;
use std::path::PathBuf;

use session_matchup::matchup::DEFAULT_SUFFIX;
use session_matchup::{
    run_matchup, ColumnSpec, MatchParams, MatchPolicy, MatchupOptions, Window, WindowAnchor,
};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PolicyArg {
    /// Closest list2 row in days; earliest row on ties
    Nearest,
    /// Last qualifying list2 row in file order (legacy OASIS matchup behaviour)
    LastWriteWins,
}

impl From<PolicyArg> for MatchPolicy {
    fn from(p: PolicyArg) -> Self {
        match p {
            PolicyArg::Nearest => MatchPolicy::Nearest,
            PolicyArg::LastWriteWins => MatchPolicy::LastWriteWins,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum AnchorArg {
    /// Bounds are days before/after each list1 row
    List1,
    /// Bounds are days before/after each list2 row (legacy OASIS matchup arithmetic)
    List2,
}

impl From<AnchorArg> for WindowAnchor {
    fn from(a: AnchorArg) -> Self {
        match a {
            AnchorArg::List1 => WindowAnchor::Primary,
            AnchorArg::List2 => WindowAnchor::Secondary,
        }
    }
}

fn cli() -> Command {
    Command::new("session_matchup")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Match each list1 row to a list2 row of the same subject by the d#### day offset in their IDs, and write the joined rows.")
        .arg(
            Arg::new("list1")
                .long("list1")
                .num_args(1)
                .required(true)
                .value_parser(value_parser!(PathBuf))
                .help("Primary CSV. First column is an ID containing d#### (e.g. OAS30001_MR_d0129); needs a Subject column."),
        )
        .arg(
            Arg::new("list2")
                .long("list2")
                .num_args(1)
                .required(true)
                .value_parser(value_parser!(PathBuf))
                .help("Secondary CSV searched for a match for every list1 row; same requirements as --list1."),
        )
        .arg(
            Arg::new("output_name")
                .long("output_name")
                .num_args(1)
                .required(true)
                .value_parser(value_parser!(PathBuf))
                .help("Output CSV; replaced if it exists."),
        )
        .arg(
            Arg::new("lower_bound")
                .long("lower_bound")
                .num_args(1)
                .default_value("180")
                .value_parser(value_parser!(u32))
                .help("Days before the anchor row a match may lie (exclusive)."),
        )
        .arg(
            Arg::new("upper_bound")
                .long("upper_bound")
                .num_args(1)
                .default_value("180")
                .value_parser(value_parser!(u32))
                .help("Days after the anchor row a match may lie (exclusive)."),
        )
        .arg(
            Arg::new("policy")
                .long("policy")
                .num_args(1)
                .default_value("nearest")
                .value_parser(value_parser!(PolicyArg))
                .help("How to choose among several list2 rows inside the window."),
        )
        .arg(
            Arg::new("anchor")
                .long("anchor")
                .num_args(1)
                .default_value("list1")
                .value_parser(value_parser!(AnchorArg))
                .help("Which row the window is centred on."),
        )
        .arg(
            Arg::new("id_column1")
                .long("id_column1")
                .num_args(1)
                .help("Header of the list1 ID column (default: first column)."),
        )
        .arg(
            Arg::new("id_column2")
                .long("id_column2")
                .num_args(1)
                .help("Header of the list2 ID column (default: first column)."),
        )
        .arg(
            Arg::new("subject_column")
                .long("subject_column")
                .num_args(1)
                .default_value("Subject")
                .help("Header of the subject column in both inputs."),
        )
        .arg(
            Arg::new("suffix")
                .long("suffix")
                .num_args(1)
                .default_value(DEFAULT_SUFFIX)
                .help("Suffix appended to every list2 column name in the output."),
        )
        .arg(
            Arg::new("summary")
                .long("summary")
                .action(ArgAction::SetTrue)
                .help("Print a JSON summary of the run to stdout."),
        )
}

fn options_from_matches(matches: &clap::ArgMatches) -> MatchupOptions {
    let path = |id: &str| matches.get_one::<PathBuf>(id).cloned().unwrap_or_default();
    let string = |id: &str| matches.get_one::<String>(id).cloned();
    let subject = string("subject_column").unwrap_or_else(|| "Subject".to_string());

    let window = Window::new(
        matches.get_one::<u32>("lower_bound").copied().unwrap_or(180),
        matches.get_one::<u32>("upper_bound").copied().unwrap_or(180),
    );
    let params = MatchParams {
        window,
        anchor: matches
            .get_one::<AnchorArg>("anchor")
            .copied()
            .map(Into::into)
            .unwrap_or_default(),
        policy: matches
            .get_one::<PolicyArg>("policy")
            .copied()
            .map(Into::into)
            .unwrap_or_default(),
        suffix: string("suffix").unwrap_or_else(|| DEFAULT_SUFFIX.to_string()),
    };

    MatchupOptions {
        list1: path("list1"),
        list2: path("list2"),
        output: path("output_name"),
        list1_columns: ColumnSpec {
            id: string("id_column1"),
            subject: subject.clone(),
        },
        list2_columns: ColumnSpec {
            id: string("id_column2"),
            subject,
        },
        params,
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let matches = cli().get_matches();
    let opts = options_from_matches(&matches);
    info!(
        "Settings: window=({}, {}), anchor={:?}, policy={:?}",
        opts.params.window.lower_bound,
        opts.params.window.upper_bound,
        opts.params.anchor,
        opts.params.policy
    );

    let summary = run_matchup(&opts).with_context(|| {
        format!(
            "matching {} against {}",
            opts.list1.display(),
            opts.list2.display()
        )
    })?;

    if matches.get_flag("summary") {
        let json = serde_json::to_string_pretty(&summary).context("serializing run summary")?;
        println!("{json}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_cli() {
        let m = cli()
            .try_get_matches_from([
                "session_matchup",
                "--list1",
                "a.csv",
                "--list2",
                "b.csv",
                "--output_name",
                "o.csv",
            ])
            .unwrap();
        let opts = options_from_matches(&m);
        assert_eq!(opts.params.window, Window::new(180, 180));
        assert_eq!(opts.params.policy, MatchPolicy::Nearest);
        assert_eq!(opts.params.anchor, WindowAnchor::Primary);
        assert_eq!(opts.params.suffix, "_list2");
        assert_eq!(opts.list1_columns.subject, "Subject");
        assert!(opts.list1_columns.id.is_none());
    }

    #[test]
    fn parses_policy_anchor_and_bounds() {
        let m = cli()
            .try_get_matches_from([
                "session_matchup",
                "--list1",
                "a.csv",
                "--list2",
                "b.csv",
                "--output_name",
                "o.csv",
                "--lower_bound",
                "365",
                "--upper_bound",
                "0",
                "--policy",
                "last-write-wins",
                "--anchor",
                "list2",
                "--id_column2",
                "MR ID",
            ])
            .unwrap();
        let opts = options_from_matches(&m);
        assert_eq!(opts.params.window, Window::new(365, 0));
        assert_eq!(opts.params.policy, MatchPolicy::LastWriteWins);
        assert_eq!(opts.params.anchor, WindowAnchor::Secondary);
        assert_eq!(opts.list2_columns.id.as_deref(), Some("MR ID"));
    }

    #[test]
    fn negative_bound_is_rejected() {
        let res = cli().try_get_matches_from([
            "session_matchup",
            "--list1",
            "a.csv",
            "--list2",
            "b.csv",
            "--output_name",
            "o.csv",
            "--lower_bound",
            "-5",
        ]);
        assert!(res.is_err());
    }

    #[test]
    fn missing_required_arg_is_rejected() {
        let res = cli().try_get_matches_from(["session_matchup", "--list1", "a.csv"]);
        assert!(res.is_err());
    }

    #[test]
    fn command_is_well_formed() {
        cli().debug_assert();
    }
}
