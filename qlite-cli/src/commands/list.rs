//! List command handler
//!
//! Shows waiting jobs per cluster and the jobs workers are running right
//! now. Nothing is locked, so a job being claimed may show up twice.

use std::path::Path;

use anyhow::Result;
use clap::Args;
use colored::*;
use qlite_core::domain::job::Identity;
use qlite_core::report::{self, ClusterQueue, ClusterSelection, FleetReport, RunningJob};
use qlite_core::spool::Spool;
use tracing::warn;

use crate::config::Config;

/// Arguments for `ql list`
#[derive(Debug, Args)]
pub struct ListArgs {
    /// Only show this cluster
    #[arg(short, long)]
    pub cluster: Option<u32>,

    /// Only print totals
    #[arg(short, long)]
    pub totals: bool,

    /// Only show running jobs
    #[arg(short, long)]
    pub running: bool,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

/// Handle `ql list`
pub fn handle_list_command(args: ListArgs, config: &Config) -> Result<()> {
    let selection = match args.cluster {
        Some(cluster) => ClusterSelection::One(cluster),
        None => ClusterSelection::All,
    };
    let report = build_report(&config.spool_dir, selection, config.privileged)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    if !args.running {
        print_queues(&report, args.totals);
    }
    if !args.totals {
        print_running(&report.running);
    }

    Ok(())
}

/// Collects the queues of the selected clusters and what their workers run
fn build_report(
    base: &Path,
    selection: ClusterSelection,
    privileged: Identity,
) -> Result<FleetReport> {
    let clusters = report::collect_queues(base, selection, privileged)?;

    let mut running = Vec::new();
    for queue in &clusters {
        let spool = Spool::for_cluster(base, queue.cluster);
        match report::collect_running(&spool) {
            Ok(jobs) => running.extend(jobs),
            Err(e) => warn!("Cannot read workers of cluster {}: {}", queue.cluster, e),
        }
    }

    Ok(FleetReport { clusters, running })
}

fn print_queues(report: &FleetReport, totals_only: bool) {
    for queue in &report.clusters {
        if totals_only {
            println!("Cluster {}: {} job(s) waiting", queue.cluster, queue.total());
        } else {
            print_queue(queue);
        }
    }

    if report.clusters.len() > 1 {
        println!(
            "{}",
            format!("Total: {} job(s) waiting", report.total_waiting()).bold()
        );
    }
}

fn print_queue(queue: &ClusterQueue) {
    println!(
        "{}",
        format!("Cluster {}: {} job(s) waiting", queue.cluster, queue.total()).bold()
    );
    for job in &queue.jobs {
        println!(
            "  {} {:>6}  {}  {}  nice {}",
            "▸".cyan(),
            job.id,
            job.file_name,
            job.owner_label.dimmed(),
            job.nice
        );
    }
    println!();
}

fn print_running(running: &[RunningJob]) {
    if running.is_empty() {
        println!("{}", "No jobs running.".yellow());
        return;
    }

    println!("{}", format!("Running {} job(s):", running.len()).bold());
    for job in running {
        println!(
            "  {} {}#{}  {}  {}  {}  nice {}",
            "▸".green(),
            job.host,
            job.instance,
            job.job_name.dimmed(),
            job.file_name,
            job.user,
            job.nice
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qlite_core::domain::job::{ControlRecord, JobId};
    use qlite_core::domain::running::RunningStatus;
    use std::fs;
    use tempfile::TempDir;

    fn queue_job(spool: &Spool, id: u64) {
        let record = ControlRecord::new("/home/tester/job.sh", Identity::new(1000, 100), 10);
        fs::write(spool.job_path(JobId(id)), "true\n").unwrap();
        fs::write(spool.control_path(JobId(id)), record.render()).unwrap();
    }

    #[test]
    fn test_report_covers_every_cluster() {
        let dir = TempDir::new().unwrap();
        let base = Spool::new(dir.path());
        let second = Spool::for_cluster(dir.path(), 2);
        fs::create_dir(second.root()).unwrap();

        queue_job(&base, 1);
        queue_job(&second, 1);
        queue_job(&second, 2);

        fs::write(second.roster_path(), "node01 1\n").unwrap();
        second
            .write_running(
                "node01",
                1,
                &RunningStatus {
                    job_name: "4711.3".to_string(),
                    file_name: "/home/tester/long.sh".to_string(),
                    user: "tester".to_string(),
                    priority: -10,
                },
            )
            .unwrap();

        let privileged = Identity::new(u32::MAX - 1, u32::MAX - 1);
        let report = build_report(dir.path(), ClusterSelection::All, privileged).unwrap();

        assert_eq!(report.clusters.len(), 2);
        assert_eq!(report.total_waiting(), 3);
        assert_eq!(report.running.len(), 1);
        assert_eq!(report.running[0].nice, 10);

        let only = build_report(dir.path(), ClusterSelection::One(2), privileged).unwrap();
        assert_eq!(only.clusters.len(), 1);
        assert_eq!(only.total_waiting(), 2);
    }

    #[test]
    fn test_report_serializes() {
        let dir = TempDir::new().unwrap();
        queue_job(&Spool::new(dir.path()), 7);

        let report = build_report(dir.path(), ClusterSelection::One(0), Identity::ROOT).unwrap();
        let json = serde_json::to_value(&report).unwrap();

        assert_eq!(json["clusters"][0]["jobs"][0]["id"], 7);
        assert_eq!(json["clusters"][0]["jobs"][0]["nice"], 10);
    }

    #[test]
    fn test_missing_cluster_is_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(build_report(dir.path(), ClusterSelection::One(5), Identity::ROOT).is_err());
    }
}
