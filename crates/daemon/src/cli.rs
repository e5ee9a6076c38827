//! Command-line surface of `quiver-worker`

use clap::{ArgAction, CommandFactory, Parser};
use quiver_core::application::{ParallelMode, WorkerMode};
use std::path::PathBuf;

/// Exit code used after printing usage
pub const USAGE_EXIT_CODE: i32 = 1;

#[derive(Parser, Debug)]
#[command(name = "quiver-worker")]
#[command(about = "Consume queued messages and jobs", long_about = None)]
#[command(version, disable_help_flag = true)]
pub struct Cli {
    /// Number of independent worker loops
    #[arg(short = 'n', long = "number-of-workers", default_value_t = 1, allow_negative_numbers = true)]
    pub number_of_workers: i64,

    /// Application environment
    #[arg(short = 'e', long)]
    pub environment: Option<String>,

    /// Only consume these queues, in this order (comma separated)
    #[arg(long, value_delimiter = ',')]
    pub queues: Option<Vec<String>>,

    /// Drain queues in priority order instead of one batch each
    #[arg(long)]
    pub priority: bool,

    /// Run each message in an isolated OS thread
    #[arg(short = 'f', long, conflicts_with = "thread")]
    pub fork: bool,

    /// Run messages concurrently on the async runtime
    #[arg(short = 't', long)]
    pub thread: bool,

    /// Also write daily-rotated log files into this directory
    #[arg(long, value_name = "DIR")]
    pub log_dir: Option<PathBuf>,

    /// Print usage
    #[arg(short = 'h', long, action = ArgAction::SetTrue)]
    pub help: bool,
}

impl Cli {
    /// Worker loop count; anything below one runs a single loop
    pub fn worker_count(&self) -> usize {
        self.number_of_workers.max(1) as usize
    }

    pub fn worker_mode(&self) -> WorkerMode {
        if self.priority {
            WorkerMode::Priority
        } else {
            WorkerMode::Fair
        }
    }

    pub fn parallel_mode(&self) -> ParallelMode {
        if self.fork {
            ParallelMode::Processes
        } else if self.thread {
            ParallelMode::Threads
        } else {
            ParallelMode::Sequential
        }
    }

    /// Queue filter with blank entries dropped
    pub fn queue_filter(&self) -> Option<Vec<String>> {
        self.queues.as_ref().map(|names| {
            names
                .iter()
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty())
                .collect()
        })
    }

    pub fn usage() -> String {
        Self::command().render_help().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("quiver-worker").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_defaults() {
        let cli = parse(&[]);
        assert_eq!(cli.worker_count(), 1);
        assert_eq!(cli.worker_mode(), WorkerMode::Fair);
        assert_eq!(cli.parallel_mode(), ParallelMode::Sequential);
        assert!(cli.queue_filter().is_none());
        assert!(!cli.help);
    }

    #[test]
    fn test_worker_count_coerced() {
        assert_eq!(parse(&["-n", "0"]).worker_count(), 1);
        assert_eq!(parse(&["-n", "-3"]).worker_count(), 1);
        assert_eq!(parse(&["--number-of-workers", "4"]).worker_count(), 4);
    }

    #[test]
    fn test_queue_filter_and_modes() {
        let cli = parse(&["--queues=b, a,", "--priority", "-t", "-e", "staging"]);
        assert_eq!(cli.queue_filter(), Some(vec!["b".to_string(), "a".to_string()]));
        assert_eq!(cli.worker_mode(), WorkerMode::Priority);
        assert_eq!(cli.parallel_mode(), ParallelMode::Threads);
        assert_eq!(cli.environment.as_deref(), Some("staging"));

        assert_eq!(parse(&["-f"]).parallel_mode(), ParallelMode::Processes);
    }

    #[test]
    fn test_fork_conflicts_with_thread() {
        assert!(Cli::try_parse_from(["quiver-worker", "-f", "-t"]).is_err());
    }

    #[test]
    fn test_help_is_a_flag() {
        let cli = parse(&["-h"]);
        assert!(cli.help);
        assert!(Cli::usage().contains("--number-of-workers"));
    }
}
