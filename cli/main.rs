use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use itertools::Itertools;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use metron::calc::estimate::{self, ItemObservation};
use metron::calc::model::ModelKind;
use metron::config::EngineConfig;
use metron::data::{ItemParamList, ItemParams, Outcome, ParamStatus, ResponseRecord, ResponseSet};
use metron::strategy::attempt::Attempt;
use metron::strategy::context::Question;
use metron::strategy::Strategy;

#[derive(Parser)]
#[command(
    name = "metron",
    about = "Estimate IRT parameters and drive adaptive test attempts",
    long_about = "Tools around the metron engine: generate synthetic response data, \
                  calibrate item parameters, estimate person abilities, and replay \
                  adaptive attempts against a fixed item pool."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a synthetic response matrix from random true parameters
    #[command(about = "Generate synthetic responses (outputs: responses.csv, items.toml, abilities.csv)")]
    Simulate {
        /// Number of simulated examinees
        #[arg(long, default_value = "200")]
        persons: usize,

        /// Number of simulated items
        #[arg(long, default_value = "20")]
        items: usize,

        /// RNG seed, so datasets are reproducible
        #[arg(long, default_value = "42")]
        seed: u64,

        /// Where to write the response CSV (person,item,fraction,timestamp)
        #[arg(long, default_value = "responses.csv")]
        out: PathBuf,

        /// Where to write the true item parameters as TOML
        #[arg(long, default_value = "items.toml")]
        items_out: PathBuf,

        /// Where to write the true abilities CSV (person,ability)
        #[arg(long, default_value = "abilities.csv")]
        abilities_out: PathBuf,
    },

    /// Calibrate item parameters from responses and known abilities
    #[command(about = "Calibrate item parameters (outputs: calibrated.toml)")]
    Calibrate {
        /// Response CSV (person,item,fraction,timestamp)
        #[arg(long)]
        responses: PathBuf,

        /// Abilities CSV (person,ability)
        #[arg(long)]
        abilities: PathBuf,

        /// Response model to fit: 1pl, 2pl, or 3pl
        #[arg(long, default_value = "2pl")]
        model: String,

        /// Where to write the calibrated item TOML
        #[arg(long, default_value = "calibrated.toml")]
        out: PathBuf,

        /// Optional engine configuration TOML
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Estimate person abilities from responses and item parameters
    #[command(about = "Estimate person abilities (CSV on stdout)")]
    Abilities {
        /// Response CSV (person,item,fraction,timestamp)
        #[arg(long)]
        responses: PathBuf,

        /// Item parameter TOML
        #[arg(long)]
        items: PathBuf,

        /// Optional engine configuration TOML
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Replay an adaptive attempt against a fixed item pool
    #[command(about = "Replay a scripted adaptive attempt")]
    Replay {
        /// Item parameter TOML
        #[arg(long)]
        items: PathBuf,

        /// Script CSV with one `fraction` column, answers in order
        #[arg(long)]
        script: PathBuf,

        /// Test strategy: fastest or classical
        #[arg(long, default_value = "fastest")]
        strategy: String,

        /// Optional engine configuration TOML
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[derive(Serialize, Deserialize)]
struct ResponseRow {
    person: u64,
    item: String,
    fraction: f64,
    #[serde(default)]
    timestamp: i64,
}

#[derive(Serialize, Deserialize)]
struct AbilityRow {
    person: u64,
    ability: f64,
}

#[derive(Deserialize)]
struct ScriptRow {
    fraction: f64,
}

#[derive(Serialize, Deserialize)]
struct ItemEntry {
    id: String,
    #[serde(default = "default_scale")]
    scale: String,
    model: ModelKind,
    #[serde(default)]
    values: Vec<f64>,
    #[serde(default)]
    pilot: bool,
}

fn default_scale() -> String {
    "all".to_string()
}

#[derive(Serialize, Deserialize)]
struct ItemFile {
    items: Vec<ItemEntry>,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();
    if let Err(error) = run(cli) {
        eprintln!("error: {error}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    match cli.command {
        Commands::Simulate {
            persons,
            items,
            seed,
            out,
            items_out,
            abilities_out,
        } => simulate(persons, items, seed, &out, &items_out, &abilities_out),
        Commands::Calibrate {
            responses,
            abilities,
            model,
            out,
            config,
        } => calibrate(&responses, &abilities, &model, &out, config.as_deref()),
        Commands::Abilities {
            responses,
            items,
            config,
        } => estimate_abilities(&responses, &items, config.as_deref()),
        Commands::Replay {
            items,
            script,
            strategy,
            config,
        } => replay(&items, &script, &strategy, config.as_deref()),
    }
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig, Box<dyn Error>> {
    match path {
        Some(path) => Ok(EngineConfig::from_toml(&fs::read_to_string(path)?)?),
        None => Ok(EngineConfig::default()),
    }
}

fn load_items(path: &Path) -> Result<Vec<(ItemEntry, Option<ItemParams>)>, Box<dyn Error>> {
    let file: ItemFile = toml::from_str(&fs::read_to_string(path)?)?;
    let mut loaded = Vec::with_capacity(file.items.len());
    for entry in file.items {
        // Pilot items may ship without parameters; everything else must
        // carry a vector matching its model.
        let params = if entry.pilot && entry.values.is_empty() {
            None
        } else {
            Some(ItemParams::new(
                entry.id.clone(),
                entry.model,
                entry.values.clone(),
                ParamStatus::SetManually,
            )?)
        };
        loaded.push((entry, params));
    }
    Ok(loaded)
}

fn load_responses(path: &Path) -> Result<Vec<ResponseRow>, Box<dyn Error>> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut rows = Vec::new();
    for row in reader.deserialize() {
        rows.push(row?);
    }
    Ok(rows)
}

fn simulate(
    persons: usize,
    items: usize,
    seed: u64,
    out: &Path,
    items_out: &Path,
    abilities_out: &Path,
) -> Result<(), Box<dyn Error>> {
    let mut rng = StdRng::seed_from_u64(seed);
    let ability_prior = Normal::new(0.0, 1.0)?;
    let difficulty_prior = Normal::new(0.0, 1.0)?;
    let discrimination_prior: Normal<f64> = Normal::new(1.0, 0.3)?;

    let abilities: Vec<f64> = (0..persons).map(|_| ability_prior.sample(&mut rng)).collect();
    let item_entries: Vec<ItemEntry> = (0..items)
        .map(|i| {
            let difficulty = difficulty_prior.sample(&mut rng);
            let discrimination = discrimination_prior.sample(&mut rng).abs().max(0.2);
            ItemEntry {
                id: format!("SIM{i:03}"),
                scale: default_scale(),
                model: ModelKind::TwoParam,
                values: vec![difficulty, discrimination],
                pilot: false,
            }
        })
        .collect();

    let model = ModelKind::TwoParam.model();
    let mut writer = csv::Writer::from_path(out)?;
    let mut timestamp = 0i64;
    for (p, ability) in abilities.iter().enumerate() {
        for entry in &item_entries {
            let probability = model.probability(*ability, &entry.values).clamp(0.0, 1.0);
            let correct = rng.gen_bool(probability);
            writer.serialize(ResponseRow {
                person: p as u64 + 1,
                item: entry.id.clone(),
                fraction: if correct { 1.0 } else { 0.0 },
                timestamp,
            })?;
            timestamp += 1;
        }
    }
    writer.flush()?;

    let mut ability_writer = csv::Writer::from_path(abilities_out)?;
    for (p, ability) in abilities.iter().enumerate() {
        ability_writer.serialize(AbilityRow {
            person: p as u64 + 1,
            ability: *ability,
        })?;
    }
    ability_writer.flush()?;

    fs::write(
        items_out,
        toml::to_string_pretty(&ItemFile { items: item_entries })?,
    )?;
    println!(
        "simulated {persons} persons on {items} items (seed {seed}); wrote {}, {}, {}",
        out.display(),
        items_out.display(),
        abilities_out.display()
    );
    Ok(())
}

fn calibrate(
    responses_path: &Path,
    abilities_path: &Path,
    model_name: &str,
    out: &Path,
    config_path: Option<&Path>,
) -> Result<(), Box<dyn Error>> {
    let config = load_config(config_path)?;
    let model: ModelKind = model_name.parse()?;
    let rows = load_responses(responses_path)?;

    let mut known_abilities = ahash::AHashMap::new();
    let mut reader = csv::Reader::from_path(abilities_path)?;
    for row in reader.deserialize() {
        let row: AbilityRow = row?;
        known_abilities.insert(row.person, row.ability);
    }

    let grouped = rows.into_iter().into_group_map_by(|row| row.item.clone());
    let mut groups: Vec<(String, Vec<ItemObservation>)> = Vec::new();
    for (item, rows) in grouped.into_iter().sorted_by(|a, b| a.0.cmp(&b.0)) {
        let mut observations = Vec::with_capacity(rows.len());
        for row in rows {
            let ability = known_abilities
                .get(&row.person)
                .ok_or_else(|| format!("no ability known for person {}", row.person))?;
            observations.push(ItemObservation {
                ability: *ability,
                outcome: Outcome::from_fraction(row.fraction)?,
            });
        }
        groups.push((item, observations));
    }

    let results = estimate::calibrate_items(&groups, model, &config.estimation);
    let mut entries = Vec::new();
    let mut failed = 0usize;
    for (item, result) in results {
        match result {
            Ok(params) => entries.push(ItemEntry {
                id: item,
                scale: default_scale(),
                model,
                values: params.values,
                pilot: false,
            }),
            Err(error) => {
                failed += 1;
                log::warn!("item `{item}` not calibrated: {error}");
            }
        }
    }
    fs::write(out, toml::to_string_pretty(&ItemFile { items: entries })?)?;
    println!(
        "calibrated {} items ({failed} failed), wrote {}",
        groups.len() - failed,
        out.display()
    );
    Ok(())
}

fn estimate_abilities(
    responses_path: &Path,
    items_path: &Path,
    config_path: Option<&Path>,
) -> Result<(), Box<dyn Error>> {
    let config = load_config(config_path)?;
    let loaded = load_items(items_path)?;
    let item_params: ItemParamList = loaded.into_iter().filter_map(|(_, params)| params).collect();
    let rows = load_responses(responses_path)?;

    let grouped = rows.into_iter().into_group_map_by(|row| row.person);
    let mut writer = csv::Writer::from_writer(std::io::stdout());
    for (person, rows) in grouped.into_iter().sorted_by_key(|(person, _)| *person) {
        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            records.push(ResponseRecord {
                person,
                item: row.item.clone(),
                outcome: Outcome::from_fraction(row.fraction)?,
                timestamp: row.timestamp,
            });
        }
        let set = ResponseSet::new(records);
        match estimate::estimate_person_ability(&set, &item_params, &config.estimation) {
            Ok(ability) => writer.serialize(AbilityRow { person, ability })?,
            Err(error) => log::warn!("person {person}: ability not estimated ({error})"),
        }
    }
    writer.flush()?;
    Ok(())
}

fn replay(
    items_path: &Path,
    script_path: &Path,
    strategy_name: &str,
    config_path: Option<&Path>,
) -> Result<(), Box<dyn Error>> {
    let config = load_config(config_path)?;
    let strategy: Strategy = strategy_name.parse()?;
    let loaded = load_items(items_path)?;
    let pool: Vec<Question> = loaded
        .into_iter()
        .map(|(entry, params)| Question {
            id: entry.id,
            scale: entry.scale,
            params,
            is_pilot: entry.pilot,
            last_attempt: None,
        })
        .collect();

    let mut reader = csv::Reader::from_path(script_path)?;
    let script: Vec<ScriptRow> = reader.deserialize().collect::<Result<_, _>>()?;

    let item_params: ItemParamList = pool.iter().filter_map(|q| q.params.clone()).collect();
    let mut attempt = Attempt::new(1, pool, strategy, config.attempt, config.estimation);
    let mut clock = 0i64;
    let mut answered: Vec<ResponseRecord> = Vec::new();
    let mut last_scale = default_scale();

    for row in &script {
        let question = match attempt.next_question(clock) {
            Ok(question) => question,
            Err(reason) => {
                println!("attempt over: {reason}");
                break;
            }
        };
        attempt.record_response(&question.id, row.fraction, clock)?;
        answered.push(ResponseRecord {
            person: 1,
            item: question.id.clone(),
            outcome: Outcome::from_fraction(row.fraction)?,
            timestamp: clock,
        });
        let ability = attempt.ability(&question.scale);
        println!(
            "{:>3}  {:<16} fraction={:.0} ability={}",
            attempt.questions_attempted(),
            question.id,
            row.fraction,
            ability.map_or("-".to_string(), |a| format!("{a:.4}")),
        );
        last_scale = question.scale;
        clock += 30;
    }

    // One more fetch surfaces the stop reason and the final ability update.
    if let Err(reason) = attempt.next_question(clock) {
        println!("attempt over: {reason}");
    }
    for param in attempt.person_params() {
        println!(
            "scale {:<12} ability {:.4} (se {})",
            param.scale,
            param.ability,
            param.standard_error.map_or("-".to_string(), |se| format!("{se:.4}"))
        );
    }
    if let Some(ability) = attempt.ability(&last_scale) {
        let set = ResponseSet::new(answered);
        let likelihood = estimate::person_likelihood_at(&set, &item_params, ability)?;
        println!("response-pattern likelihood at {ability:.4}: {likelihood:.3e}");
    }
    Ok(())
}
