use crate::catalog::{self, Catalog};
use crate::config::Settings;
use crate::convert::{self, Converter, Provenance};
use crate::error::{FileError, RunError};
use crate::filter::FilterSpec;
use crate::ledger::{self, Decision, Ledger};
use crate::stats::{FileOutcome, RunStatistics};
use crate::store::FileStore;
use crate::types::{FileRecord, RunMode};

use anyhow::{Context, Result, anyhow};
use rayon::prelude::*;
use std::collections::HashSet;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::{debug, info, warn};

/// A file that survived filtering, with its derived output key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub record: FileRecord,
    pub output_key: String,
}

/// Partition of one catalog for one run.
#[derive(Debug, Clone, Default)]
pub struct RunPlan {
    pub discovered: usize,
    /// removed by the filter chain
    pub filtered_out: usize,
    pub process: Vec<Candidate>,
    pub skip: Vec<Candidate>,
    /// survivors the run mode does not apply to
    pub exclude: Vec<Candidate>,
}

/* =========================
   Catalog
   ========================= */

/// List sources, build the snapshot, persist it. Used by `list` and by
/// `plan`/`run` unless they reuse a persisted snapshot.
pub fn list(store: &dyn FileStore, settings: &Settings) -> Result<Catalog> {
    info!(store = %store.describe(), prefix = %settings.input_prefix, "listing sources");

    let objects = catalog::list_sources(store, &settings.input_prefix)?;
    let catalog = Catalog::build(objects, OffsetDateTime::now_utc());

    let key = settings.catalog_key();
    catalog.persist(store, &key)?;

    let (numbered, unnumbered) = catalog.serial_coverage();
    info!(
        total = catalog.total_files,
        numbered, unnumbered, catalog = %key, "catalog written"
    );
    Ok(catalog)
}

/// `list` subcommand: snapshot plus a discovery-only run report.
pub fn list_only(store: &dyn FileStore, settings: &Settings) -> Result<(Catalog, RunStatistics)> {
    let started = OffsetDateTime::now_utc();
    let catalog = list(store, settings)?;

    let mut stats = RunStatistics::discovery(catalog.total_files, started);
    stats.finish(OffsetDateTime::now_utc());
    stats.log_summary();
    write_report(store, settings, &stats);

    Ok((catalog, stats))
}

fn obtain_catalog(store: &dyn FileStore, settings: &Settings, from_catalog: bool) -> Result<Catalog> {
    if !from_catalog {
        return list(store, settings);
    }
    let key = settings.catalog_key();
    let catalog = Catalog::load(store, &key)?;
    info!(
        total = catalog.total_files,
        generated_at = %catalog.generated_at,
        catalog = %key,
        "reusing persisted catalog"
    );
    Ok(catalog)
}

/* =========================
   Plan
   ========================= */

/// Filter, then sort every survivor into process / skip / exclude.
///
/// Survivors are walked in catalog order even when `last_n` reordered them.
/// Two sources with the same stem map to one output key; the first in
/// catalog order keeps it and later ones are skipped.
pub fn build_plan(
    store: &dyn FileStore,
    settings: &Settings,
    catalog: &Catalog,
    filter: &FilterSpec,
    mode: RunMode,
) -> Result<RunPlan, RunError> {
    let kept: HashSet<String> = filter
        .apply(&catalog.files, catalog.generated_at)
        .into_iter()
        .map(|r| r.key)
        .collect();
    let survivors: Vec<FileRecord> = catalog
        .files
        .iter()
        .filter(|r| kept.contains(&r.key))
        .cloned()
        .collect();

    let ledger = match mode {
        RunMode::Force => Ledger::default(),
        _ => Ledger::load(store, &settings.output_prefix)?,
    };

    let mut plan = RunPlan {
        discovered: catalog.files.len(),
        filtered_out: catalog.files.len() - survivors.len(),
        ..RunPlan::default()
    };
    let mut claimed: HashSet<String> = HashSet::new();

    for record in survivors {
        let output_key = ledger::output_key(&settings.output_prefix, &record);
        let state = ledger::inspect(store, &ledger, &output_key, mode, &settings.required_fields);
        let decision = ledger::decide(mode, state);
        debug!(key = %record.key, ?state, ?decision, "decision");

        let cand = Candidate { record, output_key };
        match decision {
            Decision::Process if !claimed.insert(cand.output_key.clone()) => {
                warn!(
                    key = %cand.record.key,
                    output = %cand.output_key,
                    "output key already claimed by an earlier file, skipped"
                );
                plan.skip.push(cand);
            }
            Decision::Process => plan.process.push(cand),
            Decision::Skip => plan.skip.push(cand),
            Decision::Exclude => plan.exclude.push(cand),
        }
    }

    Ok(plan)
}

/// chỉ "xem": không convert, không ghi output (catalog vẫn được ghi)
pub fn plan(
    store: &dyn FileStore,
    settings: &Settings,
    filter: &FilterSpec,
    mode: RunMode,
    from_catalog: bool,
) -> Result<RunPlan> {
    let catalog = obtain_catalog(store, settings, from_catalog)?;
    let plan = build_plan(store, settings, &catalog, filter, mode)?;

    println!("=== RUN PLAN ===");
    println!("Store    : {}", store.describe());
    println!("Mode     : {:?}", mode);
    println!("Filters  : {}", describe_filters(filter));
    println!(
        "Files    : discovered={} filtered_out={} process={} skip={} exclude={}",
        plan.discovered,
        plan.filtered_out,
        plan.process.len(),
        plan.skip.len(),
        plan.exclude.len()
    );
    if !plan.process.is_empty() {
        println!("\nWill process:");
        for c in &plan.process {
            println!("  - {} -> {}", c.record.key, c.output_key);
        }
    }
    if !plan.skip.is_empty() {
        println!("\nAlready processed:");
        for c in &plan.skip {
            println!("  - {}", c.record.key);
        }
    }

    Ok(plan)
}

fn describe_filters(filter: &FilterSpec) -> String {
    if filter.is_empty() {
        "(none)".to_string()
    } else {
        filter.descriptions().join(", ")
    }
}

/* =========================
   Run
   ========================= */

struct Job<'a> {
    store: &'a dyn FileStore,
    converter: &'a dyn Converter,
    settings: &'a Settings,
    scratch: &'a Path,
}

/// Progress is logged after every `every`-th attempted file.
pub fn progress_due(done: usize, every: usize) -> bool {
    done > 0 && done % every.max(1) == 0
}

/// `requested` clamped to cores and to the number of candidates.
pub fn effective_workers(requested: usize, candidates: usize) -> usize {
    requested.min(num_cpus::get()).min(candidates).max(1)
}

/// Download, stage, convert, stamp, upload. Returns the missing required
/// fields (empty when the output is complete). The staged copy is removed
/// when this returns, on success or failure.
fn process_one(job: &Job<'_>, cand: &Candidate) -> Result<Vec<String>, FileError> {
    let key = &cand.record.key;

    let bytes = job.store.get(key).map_err(FileError::Download)?;
    let digest = blake3::hash(&bytes).to_hex().to_string();

    let mut staged = tempfile::Builder::new()
        .prefix("src-")
        .suffix(".pdf")
        .tempfile_in(job.scratch)
        .map_err(FileError::Stage)?;
    staged.write_all(&bytes).map_err(FileError::Stage)?;
    staged.flush().map_err(FileError::Stage)?;
    drop(bytes);

    let doc = job.converter.convert(staged.path())?;

    let missing = convert::missing_fields(&doc, &job.settings.required_fields);
    let processed_at = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default();
    let doc = convert::with_provenance(
        doc,
        &Provenance {
            source_key: key,
            source_digest: &digest,
            processed_at: &processed_at,
        },
    );

    let body = serde_json::to_vec_pretty(&doc).map_err(FileError::Encode)?;
    job.store
        .put(&cand.output_key, &body)
        .map_err(FileError::Upload)?;

    Ok(missing)
}

fn attempt(job: &Job<'_>, cand: &Candidate) -> FileOutcome {
    debug!(key = %cand.record.key, "processing");
    match process_one(job, cand) {
        Ok(missing) => FileOutcome::Converted {
            key: cand.record.key.clone(),
            output_key: cand.output_key.clone(),
            missing,
        },
        Err(e) => FileOutcome::Failed {
            key: cand.record.key.clone(),
            reason: e.to_string(),
        },
    }
}

/// One batch run. Per-file failures are counted, never returned; only
/// setup, listing, and catalog errors come back as `Err`.
pub fn run(
    store: &dyn FileStore,
    converter: &dyn Converter,
    settings: &Settings,
    filter: &FilterSpec,
    mode: RunMode,
    from_catalog: bool,
) -> Result<RunStatistics> {
    let mut stats = RunStatistics::new(mode, OffsetDateTime::now_utc());
    stats.filters = filter.descriptions();

    let catalog = obtain_catalog(store, settings, from_catalog)?;
    let plan = build_plan(store, settings, &catalog, filter, mode)?;

    stats.discovered = plan.discovered;
    stats.filtered_out = plan.filtered_out + plan.exclude.len();
    stats.skipped = plan.skip.len();

    let total = plan.process.len();
    info!(
        mode = ?mode,
        filters = %describe_filters(filter),
        candidates = total,
        skipped = stats.skipped,
        filtered_out = stats.filtered_out,
        "starting batch"
    );

    if total > 0 {
        let scratch = tempfile::Builder::new()
            .prefix("pdf_batch_")
            .tempdir()
            .context("create scratch directory")?;
        let job = Job {
            store,
            converter,
            settings,
            scratch: scratch.path(),
        };
        let every = settings.progress_every;
        let workers = effective_workers(settings.workers, total);

        if workers <= 1 {
            for cand in &plan.process {
                stats.record(attempt(&job, cand));
                if progress_due(stats.attempted(), every) {
                    stats.log_progress(total);
                }
            }
        } else {
            info!(workers, requested = settings.workers, cores = num_cpus::get(), "parallel run");
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(workers)
                .build()
                .map_err(|e| anyhow!("rayon threadpool build failed: {e}"))?;

            let done = AtomicUsize::new(0);
            let outcomes: Vec<FileOutcome> = pool.install(|| {
                plan.process
                    .par_iter()
                    .map(|cand| {
                        let outcome = attempt(&job, cand);
                        let n = done.fetch_add(1, Ordering::Relaxed) + 1;
                        if progress_due(n, every) {
                            info!(done = n, total, "progress");
                        }
                        outcome
                    })
                    .collect()
            });

            // gom kết quả theo đúng thứ tự catalog
            for outcome in outcomes {
                stats.record(outcome);
            }
        }
    }

    stats.finish(OffsetDateTime::now_utc());
    stats.log_summary();
    write_report(store, settings, &stats);

    Ok(stats)
}

/// Best effort: outputs are already written, so a failed report only warns.
fn write_report(store: &dyn FileStore, settings: &Settings, stats: &RunStatistics) {
    let key = settings.report_key();
    let res = stats
        .to_json()
        .map_err(|e| e.to_string())
        .and_then(|body| store.put(&key, &body).map_err(|e| e.to_string()));
    match res {
        Ok(()) => debug!(report = %key, "run report written"),
        Err(e) => warn!(report = %key, error = %e, "could not write run report"),
    }
}
