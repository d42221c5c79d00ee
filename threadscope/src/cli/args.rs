//! CLI argument definitions

use clap::Parser;
use std::path::PathBuf;

use crate::domain::StackKey;

#[derive(Parser, Debug)]
#[command(
    name = "threadscope",
    about = "Summarise and query sampling-profiler recordings",
    after_help = "\
EXAMPLES:
    threadscope out.prof                                   Per-thread summary
    threadscope out.prof --top 10                          Ten hottest stacks per thread
    threadscope out.prof --thread Worker-1 --frames 'run:5;step:9'   Exact sub-stack query
    threadscope out.prof --thread Worker-1 --frames 'run;step'       Function-only query"
)]
pub struct Args {
    /// Recording to load (collapsed text or JSON lines)
    #[arg(value_name = "RECORDING")]
    pub recording: PathBuf,

    /// Restrict output to one thread label
    #[arg(short, long, value_name = "NAME")]
    pub thread: Option<String>,

    /// Frames to look for, outermost first: `fn:line;...` or `fn;...`
    #[arg(short, long, value_name = "SPEC", requires = "thread", value_parser = parse_frames)]
    pub frames: Option<StackKey>,

    /// Number of stacks to show per thread
    #[arg(long, default_value = "5")]
    pub top: usize,
}

/// Parse a `--frames` value.
///
/// Every segment carrying a `:<line>` suffix gives an exact key; no
/// segment carrying one gives a collapsed key. Mixing both is rejected.
pub fn parse_frames(value: &str) -> Result<StackKey, String> {
    let segments: Vec<&str> = value.split(';').map(str::trim).collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err("frame list contains an empty frame".to_string());
    }

    let exact: Vec<Option<(&str, u32)>> = segments
        .iter()
        .map(|segment| {
            segment
                .rsplit_once(':')
                .and_then(|(function, line)| line.parse().ok().map(|line| (function, line)))
                .filter(|(function, _)| !function.is_empty())
        })
        .collect();

    if exact.iter().all(Option::is_some) {
        Ok(StackKey::exact_from(exact.into_iter().flatten()))
    } else if exact.iter().all(Option::is_none) {
        Ok(StackKey::collapsed_from(segments))
    } else {
        Err("frames must either all carry a line number or none may".to_string())
    }
}
