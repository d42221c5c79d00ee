//! # threadscope - Recording Report
//!
//! Loads a recording written by the sampling engine and either:
//! - **Summarises** it: metadata, counters and each thread's hottest stacks
//! - **Queries** it (`--thread NAME --frames SPEC`): prints the value of the
//!   first stack containing the frames, exit code 3 if none does

use anyhow::Result;
use clap::Parser;
use log::info;

use threadscope::analysis::StackAggregator;
use threadscope::cli::Args;
use threadscope::domain::StackKey;
use threadscope::recording::Recording;

// Exit codes
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_USAGE: i32 = 2;
const EXIT_NO_MATCH: i32 = 3;

enum Outcome {
    Done,
    NoMatch,
    UnknownThread(String),
}

fn main() {
    env_logger::init();
    std::process::exit(match run() {
        Ok(outcome) => exit_code_for(&outcome),
        Err(e) => {
            eprintln!("error: {e:#}");
            EXIT_ERROR
        }
    });
}

fn exit_code_for(outcome: &Outcome) -> i32 {
    match outcome {
        Outcome::Done => EXIT_SUCCESS,
        Outcome::NoMatch => EXIT_NO_MATCH,
        Outcome::UnknownThread(_) => EXIT_USAGE,
    }
}

fn unknown_thread(aggregator: &StackAggregator, thread: &str) -> Outcome {
    let known: Vec<&str> = aggregator.threads().collect();
    eprintln!("error: unknown thread {thread:?}; recorded threads: {known:?}");
    Outcome::UnknownThread(thread.to_string())
}

fn run() -> Result<Outcome> {
    let args = Args::parse();

    let recording = Recording::from_path(&args.recording)?;
    info!(
        "Loaded {} samples from {}",
        recording.samples.len(),
        args.recording.display()
    );
    let aggregator = StackAggregator::from_recording(&recording);

    if let (Some(thread), Some(frames)) = (&args.thread, &args.frames) {
        return Ok(query(&aggregator, thread, frames));
    }

    if let Some(thread) = &args.thread {
        if aggregator.histogram(thread).is_none() {
            return Ok(unknown_thread(&aggregator, thread));
        }
    }

    print!("{}", recording.metadata);
    println!("threads: {}", aggregator.thread_count());
    println!("samples: {}", aggregator.sample_count());
    println!("total:   {}", aggregator.total_metric());

    let threads: Vec<&str> = match &args.thread {
        Some(thread) => vec![thread.as_str()],
        None => aggregator.threads().collect(),
    };

    for thread in threads {
        println!();
        println!("{thread}");
        for share in aggregator.top_stacks(thread, args.top) {
            println!(
                "  {:>12} {:>6.1}%  {}",
                share.value, share.percentage, share.stack
            );
        }
    }

    Ok(Outcome::Done)
}

fn query(aggregator: &StackAggregator, thread: &str, frames: &StackKey) -> Outcome {
    if aggregator.histogram(thread).is_none() {
        return unknown_thread(aggregator, thread);
    }
    match aggregator.query(thread, frames) {
        Some(value) => {
            println!("{value}");
            Outcome::Done
        }
        None => {
            eprintln!("no stack of {thread} contains {frames}");
            Outcome::NoMatch
        }
    }
}
