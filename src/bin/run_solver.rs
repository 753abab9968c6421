use anyhow::{Context, Result, bail};
use serde_json::{Map, Value};
use std::env;
use std::fs;
use std::path::Path;
use walkdir::WalkDir;

use geo_formal::solver::Solver;

/// Passes of the forward sweep before giving up on the goal.
const MAX_PASSES: usize = 10;

fn load_json(path: &Path) -> Result<Value> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

/// A theorem GDL file, or a directory of them merged into one object.
fn load_theorems(path: &Path) -> Result<Value> {
    if path.is_file() {
        return load_json(path);
    }
    let mut merged = Map::new();
    for entry in WalkDir::new(path).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file()
            || entry.path().extension().and_then(|e| e.to_str()) != Some("json")
        {
            continue;
        }
        let value = load_json(entry.path())?;
        let Value::Object(map) = value else {
            bail!("{} is not a theorem GDL object", entry.path().display());
        };
        for (name, decl) in map {
            merged.insert(name, decl);
        }
    }
    Ok(Value::Object(merged))
}

fn main() -> Result<()> {
    simple_logger::SimpleLogger::new()
        .with_level(log::LevelFilter::Info)
        .init()
        .ok();

    let args: Vec<String> = env::args().collect();
    if args.len() != 4 {
        bail!("usage: run-solver <predicate-gdl.json> <theorem-gdl.json|dir> <problem-cdl.json>");
    }

    let predicate_gdl = load_json(Path::new(&args[1]))?;
    let theorem_gdl = load_theorems(Path::new(&args[2]))?;
    let problem_cdl = load_json(Path::new(&args[3]))?;

    let mut solver = Solver::new(&predicate_gdl, &theorem_gdl)?;
    solver.load_problem(&problem_cdl)?;

    let theorem_names: Vec<String> = solver
        .theorem_gdl()
        .iter()
        .filter(|(_, def)| !def.is_definition())
        .map(|(name, _)| name.clone())
        .collect();

    // forward sweep: rough-apply every theorem until the goal closes or a
    // whole pass adds nothing
    let mut solved = solver.check_goal()?;
    for _pass in 0..MAX_PASSES {
        if solved {
            break;
        }
        let mut update = false;
        for name in &theorem_names {
            update |= solver.apply_theorem(name, None)?;
        }
        solved = solver.check_goal()?;
        if !update {
            break;
        }
    }

    let report = solver.solution_report();
    println!("{}", serde_json::to_string_pretty(&report)?);
    if report.solved {
        println!("goal solved: {:?}", report.solved_answer);
    } else {
        println!("goal not solved");
    }
    Ok(())
}
