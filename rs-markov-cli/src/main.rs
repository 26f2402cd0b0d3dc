use std::fs;
use std::io;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use rand::SeedableRng;
use rand::rngs::StdRng;

use rs_markov_core::error::Error;
use rs_markov_core::model::generator::SeedSpec;
use rs_markov_core::model::key::KeyMode;
use rs_markov_core::ops;
use rs_markov_core::tokenizer::CharTokenizer;

/// Markov model shell: build, merge, inspect and sample n-gram stores.
#[derive(Parser, Debug)]
#[command(name = "rs-markov")]
#[command(about = "Build, merge and sample Markov n-gram model stores", long_about = None)]
struct Cli {
	#[command(subcommand)]
	command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Ingest a text file into a model store
	Build {
		/// Source text file
		file: PathBuf,
		/// Model store path
		#[arg(short, long, default_value = "markov.json")]
		db: PathBuf,
		/// Number of prefix tokens per key
		#[arg(short, long, default_value_t = 2)]
		order: usize,
		/// Store keys as JSON arrays instead of concatenated strings
		#[arg(long)]
		tupled: bool,
	},
	/// Merge one model store into another
	Merge {
		/// Store to read from
		source: PathBuf,
		/// Store to merge into
		dest: PathBuf,
		#[arg(long)]
		tupled: bool,
	},
	/// Count n-grams in a text file and print a ranked report
	Count {
		/// Source text file
		file: PathBuf,
		/// Tokens per n-gram
		#[arg(short, long, default_value_t = 1)]
		order: usize,
		/// Show only the most frequent entries
		#[arg(short, long)]
		limit: Option<usize>,
	},
	/// Generate text by walking a model store
	Generate {
		/// Model store path
		#[arg(default_value = "markov.json")]
		db: PathBuf,
		/// Comma-separated tokens used verbatim as the starting key
		#[arg(short, long, conflicts_with = "keyword")]
		key: Option<String>,
		/// Pick the starting key among those matching this keyword
		#[arg(long)]
		keyword: Option<String>,
		/// Number of tokens to generate
		#[arg(short, long, default_value_t = 100)]
		length: usize,
		/// Trim the output to a single sentence
		#[arg(short, long)]
		strip: bool,
		/// Number of prefix tokens per lookup key
		#[arg(short, long, default_value_t = 2)]
		order: usize,
		#[arg(long)]
		tupled: bool,
		/// Random seed for reproducible output
		#[arg(long)]
		seed: Option<u64>,
		/// Report generation progress on stderr
		#[arg(long)]
		progress: bool,
	},
	/// Search stored keys by substring
	Search {
		/// Model store path
		#[arg(default_value = "markov.json")]
		db: PathBuf,
		/// Keyword to search for; omit for an interactive prompt
		#[arg(short, long)]
		keyword: Option<String>,
		/// Treat each keyword character as a separate substring in order
		#[arg(short, long)]
		loose: bool,
		#[arg(long)]
		tupled: bool,
	},
}

fn key_mode(tupled: bool) -> KeyMode {
	if tupled { KeyMode::Tupled } else { KeyMode::Concatenated }
}

/// Caps console progress updates to one per interval, plus the final one.
struct Throttle {
	enabled: bool,
	interval: Duration,
	last: Option<Instant>,
}

impl Throttle {
	fn new(interval: Duration, enabled: bool) -> Self {
		Self { enabled, interval, last: None }
	}

	fn report(&mut self, current: usize, total: usize) {
		if !self.enabled {
			return;
		}
		let due = self.last.map(|last| last.elapsed() >= self.interval).unwrap_or(true);
		if due || current == total {
			eprint!("\r{} / {} tokens", current, total);
			let _ = io::stderr().flush();
			self.last = Some(Instant::now());
		}
	}

	fn finish(&self) {
		if self.enabled && self.last.is_some() {
			eprintln!();
		}
	}
}

fn print_search(db: &Path, mode: KeyMode, keyword: &str, loose: bool) -> Result<(), Error> {
	let results = ops::search_store(db, mode, keyword, loose)?;
	println!("{}", "=".repeat(30));
	for (key, successors) in &results {
		println!("{} : {}", key, successors.join(","));
	}
	println!("{}", "=".repeat(30));
	Ok(())
}

fn interactive_search(db: &Path, mode: KeyMode, loose: bool) -> Result<(), Error> {
	let stdin = io::stdin();
	loop {
		print!("keyword: ");
		let _ = io::stdout().flush();

		let mut line = String::new();
		if stdin.lock().read_line(&mut line)? == 0 {
			break;
		}
		let keyword = line.trim();
		if keyword == "/quit" {
			break;
		}
		if keyword.is_empty() {
			continue;
		}
		print_search(db, mode, keyword, loose)?;
	}
	Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
	env_logger::init();
	let cli = Cli::parse();

	match cli.command {
		Command::Build { file, db, order, tupled } => {
			let text = fs::read_to_string(&file)?;
			let title = file
				.file_stem()
				.map(|stem| stem.to_string_lossy().into_owned());
			let keys = ops::build_and_persist(
				&db,
				&text,
				order,
				key_mode(tupled),
				&CharTokenizer,
				title.as_deref(),
			)?;
			println!("ingested {} keys into {}", keys, db.display());
		}
		Command::Merge { source, dest, tupled } => {
			let keys = ops::merge_store(&source, &dest, key_mode(tupled))?;
			println!("merged {} keys into {}", keys, dest.display());
		}
		Command::Count { file, order, limit } => {
			let text = fs::read_to_string(&file)?;
			let ranked = ops::count_ngrams_text(&text, order, KeyMode::Concatenated, &CharTokenizer)?;
			for (gram, count) in ranked.iter().take(limit.unwrap_or(ranked.len())) {
				println!("{}\t{}", count, gram);
			}
		}
		Command::Generate { db, key, keyword, length, strip, order, tupled, seed, progress } => {
			let spec = match (key, keyword) {
				(Some(key), _) => SeedSpec::Explicit(key.split(',').map(str::to_owned).collect()),
				(None, Some(keyword)) => SeedSpec::Keyword(keyword),
				(None, None) => SeedSpec::Random,
			};
			let rng = match seed {
				Some(seed) => StdRng::seed_from_u64(seed),
				None => StdRng::from_os_rng(),
			};

			let mut throttle = Throttle::new(Duration::from_millis(200), progress);
			let result = ops::generate_text(
				&db,
				key_mode(tupled),
				order,
				spec,
				length,
				strip,
				rng,
				|current, total| throttle.report(current, total),
			);
			throttle.finish();

			match result {
				Ok(text) => println!("{}", text),
				Err(Error::NoSeedFound) => {
					eprintln!("no key matched, try another keyword or seed");
					std::process::exit(1);
				}
				Err(err) => return Err(err.into()),
			}
		}
		Command::Search { db, keyword, loose, tupled } => match keyword {
			Some(keyword) => print_search(&db, key_mode(tupled), &keyword, loose)?,
			None => interactive_search(&db, key_mode(tupled), loose)?,
		},
	}

	Ok(())
}
