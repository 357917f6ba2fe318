//! Shared test utilities and SCF-like fixture generators
#![allow(dead_code)]

use finlit::pipeline::SourcePaths;
use polars::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Correct answer code of each quiz item, in the default item order:
/// interest "more than $102" (1), inflation "less than today" (5) and
/// diversification "false" (5)
pub const CORRECT_CODES: [i64; 3] = [1, 5, 5];

/// A wrong answer code for each item ("exactly the same", "exactly the
/// same", "true")
pub const WRONG_CODES: [i64; 3] = [3, 3, 1];

/// True net worth gain per correct quiz answer, in dollars
pub const LITERACY_EFFECT: f64 = 50_000.0;

/// Every `MISSING_INCOME_EVERY`-th household reports no income, leaving
/// its wealth/income ratio undefined
pub const MISSING_INCOME_EVERY: i64 = 50;

/// The three input tables of a synthetic survey, before writing
pub struct ScfFrames {
    pub main: DataFrame,
    pub summary: DataFrame,
    pub weights: DataFrame,
}

/// A synthetic survey written to CSV files inside a temporary directory
pub struct ScfFixture {
    pub dir: TempDir,
    pub paths: SourcePaths,
}

impl ScfFixture {
    pub fn output_dir(&self) -> PathBuf {
        self.dir.path().join("output")
    }
}

/// Build SCF-like tables for `households` households with five implicates each.
///
/// Net worth is `20000 + 50000 * score + noise` with noise uniform on
/// +/-30000, so the median regression slope on the score is 0.5 in
/// $100k units. Quiz answers and demographics are fixed per household;
/// wealth, income and the survey weight vary across implicates.
pub fn scf_frames(households: usize, replicates: usize, seed: u64) -> ScfFrames {
    let mut rng = StdRng::seed_from_u64(seed);
    let n = households * 5;

    let mut main_y1 = Vec::with_capacity(n);
    let mut main_yy1 = Vec::with_capacity(n);
    let mut answers: [Vec<i64>; 3] = [
        Vec::with_capacity(n),
        Vec::with_capacity(n),
        Vec::with_capacity(n),
    ];

    let mut y1 = Vec::with_capacity(n);
    let mut yy1 = Vec::with_capacity(n);
    let mut hhsex = Vec::with_capacity(n);
    let mut racecl4 = Vec::with_capacity(n);
    let mut edcl = Vec::with_capacity(n);
    let mut married = Vec::with_capacity(n);
    let mut kids = Vec::with_capacity(n);
    let mut occat1 = Vec::with_capacity(n);
    let mut age = Vec::with_capacity(n);
    let mut networth = Vec::with_capacity(n);
    let mut asset = Vec::with_capacity(n);
    let mut fin = Vec::with_capacity(n);
    let mut nfin = Vec::with_capacity(n);
    let mut income = Vec::with_capacity(n);
    let mut wgt = Vec::with_capacity(n);

    let mut weight_ids = Vec::with_capacity(households);
    let mut replicate_values: Vec<Vec<f64>> = vec![Vec::with_capacity(households); replicates];

    for h in 1..=households as i64 {
        let score: i64 = rng.gen_range(0..=3);
        let sex: i64 = rng.gen_range(1..=2);
        let race: i64 = rng.gen_range(1..=4);
        let education: i64 = rng.gen_range(1..=4);
        let marital: i64 = rng.gen_range(1..=2);
        let children: i64 = rng.gen_range(0..=4);
        let occupation: i64 = rng.gen_range(1..=4);
        let hh_age: i64 = rng.gen_range(25..=85);
        let base_weight: f64 = rng.gen_range(1000.0..5000.0);

        weight_ids.push(h);
        for column in replicate_values.iter_mut() {
            column.push(base_weight * rng.gen_range(0.8..1.2));
        }

        for k in 1..=5i64 {
            let person = 10 * h + k;

            main_y1.push(person);
            main_yy1.push(h);
            for item in 0..3 {
                let answer = if (item as i64) < score {
                    CORRECT_CODES[item]
                } else {
                    WRONG_CODES[item]
                };
                answers[item].push(answer);
            }

            let nw = 20_000.0 + LITERACY_EFFECT * score as f64 + rng.gen_range(-30_000.0..30_000.0);
            let financial = 0.4 * nw + rng.gen_range(-5_000.0..5_000.0);
            let household_income = if h % MISSING_INCOME_EVERY == 0 {
                None
            } else {
                Some(rng.gen_range(30_000.0..150_000.0))
            };

            y1.push(person);
            yy1.push(h);
            hhsex.push(sex);
            racecl4.push(race);
            edcl.push(education);
            married.push(marital);
            kids.push(children);
            occat1.push(occupation);
            age.push(hh_age);
            networth.push(nw);
            asset.push(nw + rng.gen_range(0.0..50_000.0));
            fin.push(financial);
            nfin.push(nw - financial);
            income.push(household_income);
            wgt.push(base_weight * rng.gen_range(0.95..1.05));
        }
    }

    // Upper-case names as in the public data set
    let main = DataFrame::new(vec![
        Column::new("Y1".into(), main_y1),
        Column::new("YY1".into(), main_yy1),
        Column::new("X7558".into(), std::mem::take(&mut answers[0])),
        Column::new("X7559".into(), std::mem::take(&mut answers[1])),
        Column::new("X7560".into(), std::mem::take(&mut answers[2])),
    ])
    .unwrap();

    let summary = DataFrame::new(vec![
        Column::new("y1".into(), y1),
        Column::new("yy1".into(), yy1),
        Column::new("hhsex".into(), hhsex),
        Column::new("racecl4".into(), racecl4),
        Column::new("edcl".into(), edcl),
        Column::new("married".into(), married),
        Column::new("kids".into(), kids),
        Column::new("occat1".into(), occat1),
        Column::new("age".into(), age),
        Column::new("networth".into(), networth),
        Column::new("asset".into(), asset),
        Column::new("fin".into(), fin),
        Column::new("nfin".into(), nfin),
        Column::new("income".into(), income),
        Column::new("wgt".into(), wgt),
    ])
    .unwrap();

    let mut weight_columns = vec![Column::new("yy1".into(), weight_ids)];
    for (r, values) in replicate_values.into_iter().enumerate() {
        weight_columns.push(Column::new(format!("wt1b{}", r + 1).into(), values));
    }
    let weights = DataFrame::new(weight_columns).unwrap();

    ScfFrames {
        main,
        summary,
        weights,
    }
}

/// Write a DataFrame to a CSV file
pub fn write_csv(df: &mut DataFrame, path: &Path) {
    let mut file = std::fs::File::create(path).unwrap();
    CsvWriter::new(&mut file).finish(df).unwrap();
}

/// Write the three tables as CSV files in a fresh temporary directory
pub fn write_frames(mut frames: ScfFrames) -> ScfFixture {
    let dir = TempDir::new().unwrap();
    let paths = SourcePaths {
        main: dir.path().join("p19i6.csv"),
        summary: dir.path().join("rscfp2019.csv"),
        weights: dir.path().join("p19_rw1.csv"),
    };
    write_csv(&mut frames.main, &paths.main);
    write_csv(&mut frames.summary, &paths.summary);
    write_csv(&mut frames.weights, &paths.weights);
    ScfFixture { dir, paths }
}

/// Generate and write a synthetic survey
pub fn create_scf_fixture(households: usize, replicates: usize, seed: u64) -> ScfFixture {
    write_frames(scf_frames(households, replicates, seed))
}

/// Float values of a column, nulls dropped
pub fn float_column(df: &DataFrame, name: &str) -> Vec<f64> {
    df.column(name)
        .unwrap()
        .cast(&DataType::Float64)
        .unwrap()
        .f64()
        .unwrap()
        .into_iter()
        .flatten()
        .collect()
}

/// Assert that a DataFrame contains specific columns
pub fn assert_has_columns(df: &DataFrame, expected_cols: &[&str]) {
    let actual_cols: Vec<String> = df.get_column_names().iter().map(|s| s.to_string()).collect();
    for col in expected_cols {
        assert!(
            actual_cols.contains(&col.to_string()),
            "Missing expected column: '{}'. Actual columns: {:?}",
            col,
            actual_cols
        );
    }
}
