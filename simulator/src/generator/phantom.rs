use crate::workflow::config::{is_yaml, FieldScanner};
use anyhow::{ensure, Context};
use echocore::phantom::{BackscatterPoint, Scatterer, ScattererPhantom};
use echocore::Vector3;
use log::info;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Cubic meters per cubic millimeter.
const MM3: f64 = 1e-9;

/// Parameters of a uniformly populated phantom.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhantomConfig {
    pub size: Vector3,
    /// Scatterers per cubic millimeter.
    pub density: f64,
    pub sound_speed: f64,
    /// `a0, a1, a2` of the attenuation polynomial in MHz, Np/m.
    pub attenuation: [f64; 3],
    pub backscatter_file: PathBuf,
    pub phantom_file: PathBuf,
}

impl PhantomConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref)
            .with_context(|| format!("reading phantom config {}", path_ref.display()))?;
        let config = if is_yaml(path_ref) {
            serde_yaml::from_str(&contents)
                .with_context(|| format!("parsing phantom config {}", path_ref.display()))?
        } else {
            Self::parse_legacy(&contents)
                .with_context(|| format!("parsing phantom config {}", path_ref.display()))?
        };
        Ok(config)
    }

    pub fn parse_legacy(contents: &str) -> anyhow::Result<Self> {
        let mut scanner = FieldScanner::new(contents);
        let size = scanner.numbers::<f64>("phantom size x, y, z", 3)?;
        let density = scanner.number("scatterer density")?;
        let sound_speed = scanner.number("sound speed")?;
        let attenuation = scanner.numbers::<f64>("attenuation a0, a1, a2", 3)?;
        let backscatter_file = PathBuf::from(scanner.text("backscatter file")?);
        let phantom_file = PathBuf::from(scanner.text("phantom file")?);

        Ok(Self {
            size: Vector3::new(size[0], size[1], size[2]),
            density,
            sound_speed,
            attenuation: [attenuation[0], attenuation[1], attenuation[2]],
            backscatter_file,
            phantom_file,
        })
    }

    /// Expected scatterer count, `density · volume`.
    pub fn scatterer_count(&self) -> anyhow::Result<usize> {
        let volume_mm3 = self.size.x * self.size.y * self.size.z / MM3;
        let count = (self.density * volume_mm3).round();
        ensure!(
            count.is_finite() && count >= 0.0,
            "density {} over {:?} gives no valid scatterer count",
            self.density,
            self.size
        );
        Ok(count as usize)
    }
}

/// Reads `frequency_mhz value` pairs, one per line; `#` starts a comment.
pub fn parse_backscatter(contents: &str) -> anyhow::Result<Vec<BackscatterPoint>> {
    let mut points = Vec::new();
    for (number, line) in contents.lines().enumerate() {
        let line = line.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        let mut fields = line.split(|c: char| c == ',' || c.is_whitespace());
        let mut next = |name: &str| -> anyhow::Result<f64> {
            let token = fields
                .find(|token| !token.is_empty())
                .with_context(|| format!("line {}: missing {}", number + 1, name))?;
            token
                .parse()
                .with_context(|| format!("line {}: bad {} `{}`", number + 1, name, token))
        };
        let frequency_mhz = next("frequency")?;
        let value = next("coefficient")?;
        points.push(BackscatterPoint {
            frequency_mhz,
            value,
        });
    }
    ensure!(!points.is_empty(), "backscatter table is empty");
    Ok(points)
}

pub fn read_backscatter<P: AsRef<Path>>(path: P) -> anyhow::Result<Vec<BackscatterPoint>> {
    let path_ref = path.as_ref();
    let contents = fs::read_to_string(path_ref)
        .with_context(|| format!("reading backscatter file {}", path_ref.display()))?;
    parse_backscatter(&contents)
        .with_context(|| format!("parsing backscatter file {}", path_ref.display()))
}

/// Draws scatterers uniformly over the phantom volume.
pub fn build_uniform_phantom(
    config: &PhantomConfig,
    backscatter: Vec<BackscatterPoint>,
    seed: u64,
) -> anyhow::Result<ScattererPhantom> {
    let count = config.scatterer_count()?;
    let mut rng = StdRng::seed_from_u64(seed);
    let scatterers = (0..count)
        .map(|_| {
            Scatterer::new(
                rng.gen::<f64>() * config.size.x,
                rng.gen::<f64>() * config.size.y,
                rng.gen::<f64>() * config.size.z,
            )
        })
        .collect();

    let phantom = ScattererPhantom::new(
        config.size,
        config.sound_speed,
        config.attenuation,
        backscatter,
        scatterers,
    )
    .context("building uniform phantom")?;
    Ok(phantom)
}

/// Builds the configured phantom and writes it to `config.phantom_file`.
pub fn create_phantom(config: &PhantomConfig, seed: u64) -> anyhow::Result<ScattererPhantom> {
    let backscatter = read_backscatter(&config.backscatter_file)?;
    let phantom = build_uniform_phantom(config, backscatter, seed)?;
    phantom
        .save(&config.phantom_file)
        .with_context(|| format!("writing phantom {}", config.phantom_file.display()))?;
    info!(
        "created phantom {} with {} scatterers (seed {})",
        config.phantom_file.display(),
        phantom.scatterers().len(),
        seed
    );
    Ok(phantom)
}
