//! Job scripts: what a backend is asked to run for one grid point.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use scalekit_core::point::ScalingPoint;
use scalekit_core::workload::Workload;

/// File name of the rendered script inside the working directory.
pub const SCRIPT_FILE: &str = "job.sh";

/// File the rendered script writes the command's exit code to.
pub const EXIT_STATUS_FILE: &str = ".exit_status";

/// A fully resolved job: command line, resources, and locations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobScript {
    pub name: String,
    pub working_dir: PathBuf,
    /// Where the simulator log ends up.
    pub log_path: PathBuf,
    pub command: String,
    pub args: Vec<String>,
    pub processes: u32,
    pub threads_per_process: u32,
    pub nodes: u32,
}

impl JobScript {
    /// Resolve `workload` for `point`.
    ///
    /// The placeholders `{processes}`, `{threads}`, `{dir}`, and `{name}`
    /// in the workload arguments are substituted.
    pub fn for_point(
        workload: &Workload,
        point: &ScalingPoint,
        name: &str,
        working_dir: &Path,
    ) -> Self {
        let dir = working_dir.display().to_string();
        let args = workload
            .args
            .iter()
            .map(|arg| {
                arg.replace("{processes}", &point.processes.to_string())
                    .replace("{threads}", &point.cores_per_process.to_string())
                    .replace("{dir}", &dir)
                    .replace("{name}", name)
            })
            .collect();

        Self {
            name: name.to_string(),
            working_dir: working_dir.to_path_buf(),
            log_path: working_dir.join(format!("{}_log.txt", workload.name)),
            command: workload.command.clone(),
            args,
            processes: point.processes,
            threads_per_process: point.cores_per_process,
            nodes: point.nodes,
        }
    }

    /// Render a POSIX shell script that runs the job in its working
    /// directory and records the exit code in [`EXIT_STATUS_FILE`].
    pub fn render_shell(&self) -> String {
        let mut out = String::from("#!/bin/sh\n");
        let _ = writeln!(out, "# {}", self.name);
        let _ = writeln!(out, "cd {} || exit 1", quote(&self.working_dir.display().to_string()));
        let _ = writeln!(out, "export OMP_NUM_THREADS={}", self.threads_per_process);

        let mut line = String::new();
        if self.processes > 1 {
            let _ = write!(line, "mpirun -np {} ", self.processes);
        }
        line.push_str(&quote(&self.command));
        for arg in &self.args {
            line.push(' ');
            line.push_str(&quote(arg));
        }
        let _ = writeln!(
            out,
            "{line} > {} 2>&1",
            quote(&self.log_path.display().to_string())
        );
        // Written atomically so a poll never sees a partial file.
        let _ = writeln!(out, "code=$?");
        let _ = writeln!(out, "echo $code > {EXIT_STATUS_FILE}.tmp");
        let _ = writeln!(out, "mv {EXIT_STATUS_FILE}.tmp {EXIT_STATUS_FILE}");
        out
    }
}

/// Single-quote `s` for the shell.
fn quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use scalekit_core::workload::WorkloadSize;

    fn workload() -> Workload {
        Workload {
            name: "galaxy".to_string(),
            command: "skirt".to_string(),
            args: vec!["-t".to_string(), "{threads}".to_string(), "{name}.ski".to_string()],
            size: WorkloadSize {
                packages: 1000,
                wavelengths: 10,
                dust_cells: 100,
            },
        }
    }

    fn point(processes: u32, threads: u32) -> ScalingPoint {
        ScalingPoint {
            processes,
            cores_per_process: threads,
            nodes: 1,
            hybrid: threads > 1,
        }
    }

    #[test]
    fn placeholders_are_substituted() {
        let dir = Path::new("/scratch/run");
        let script = JobScript::for_point(&workload(), &point(1, 4), "job", dir);
        assert_eq!(script.args, vec!["-t", "4", "job.ski"]);
        assert_eq!(script.log_path, PathBuf::from("/scratch/run/galaxy_log.txt"));
    }

    #[test]
    fn multi_process_jobs_use_mpirun() {
        let dir = Path::new("/scratch/run");
        let script = JobScript::for_point(&workload(), &point(4, 2), "job", dir);
        let text = script.render_shell();
        assert!(text.contains("export OMP_NUM_THREADS=2"));
        assert!(text.contains(
            "mpirun -np 4 'skirt' '-t' '2' 'job.ski' > '/scratch/run/galaxy_log.txt' 2>&1"
        ));
        assert!(text.ends_with("mv .exit_status.tmp .exit_status\n"));
    }

    #[test]
    fn single_quotes_are_escaped() {
        assert_eq!(quote("it's"), r"'it'\''s'");
    }
}
