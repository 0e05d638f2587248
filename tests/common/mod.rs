use medcharge::data::Record;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use std::path::{Path, PathBuf};

const REGIONS: [&str; 4] = ["northeast", "northwest", "southeast", "southwest"];

/// Records whose charges are `1000 + 50 * age + noise`; every other field is
/// unrelated to the response. Categorical levels cycle so each appears often.
pub fn age_driven_records(n: usize, seed: u64) -> Vec<Record> {
    let mut rng = StdRng::seed_from_u64(seed);
    let noise = Normal::new(0.0, 100.0).expect("valid normal");
    (0..n)
        .map(|i| {
            let age: u32 = rng.gen_range(18..=64);
            Record {
                age,
                gender: if i % 2 == 0 { "female" } else { "male" }.to_string(),
                bmi: rng.gen_range(16.0..45.0),
                kids: rng.gen_range(0..=4),
                smoker: if i % 3 == 0 { "yes" } else { "no" }.to_string(),
                exercise: rng.gen_range(0..=7),
                region: REGIONS[i % REGIONS.len()].to_string(),
                charges: 1000.0 + 50.0 * f64::from(age) + noise.sample(&mut rng),
            }
        })
        .collect()
}

/// Writes records as a headed CSV file named `name` inside `dir`.
pub fn write_csv(dir: &Path, name: &str, records: &[Record]) -> PathBuf {
    let path = dir.join(name);
    let mut writer = csv::Writer::from_path(&path).expect("create csv");
    for record in records {
        writer.serialize(record).expect("write record");
    }
    writer.flush().expect("flush csv");
    path
}
