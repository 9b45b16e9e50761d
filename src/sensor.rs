//! Simulated sensor module.
//!
//! A [`Sensor`] is a named scalar source owned by exactly one device client. Each sensor
//! carries its signal model, the model's running state and its own seeded random source,
//! so a sensor built with [`Sensor::with_seed`] replays the same sequence on every run.

use std::f64::consts::PI;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Readings are clamped to this magnitude so a runaway drift never leaves the finite range.
pub const READING_LIMIT: f64 = 1e9;

/// Errors raised while building a sensor.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SensorError {
    /// A model parameter is outside its valid range
    #[error("invalid parameter '{parameter}': {reason}")]
    InvalidParameter {
        parameter: &'static str,
        reason: String,
    },

    /// Sensor names must be non-empty
    #[error("sensor name must not be empty")]
    EmptyName,
}

/// `target + noise * U(0,1)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConstantParams {
    pub target: f64,
    pub noise: f64,
}

impl Default for ConstantParams {
    fn default() -> Self {
        Self {
            target: 0.0,
            noise: 0.0,
        }
    }
}

/// `Normal(mean, sigma)` on every call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GaussianParams {
    pub mean: f64,
    pub sigma: f64,
}

impl Default for GaussianParams {
    fn default() -> Self {
        Self {
            mean: 0.0,
            sigma: 1.0,
        }
    }
}

/// Periodic base term plus Gaussian noise and a random-walk drift.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CosineParams {
    pub amplitude: f64,
    /// Period in ticks (one tick per read)
    pub period: f64,
    pub noise: f64,
    pub drift_scale: f64,
}

impl Default for CosineParams {
    fn default() -> Self {
        Self {
            amplitude: 1.0,
            period: 100.0,
            noise: 0.05,
            drift_scale: 0.0002,
        }
    }
}

/// Trend, two seasonal terms, AR(1) noise, drift, rare spikes and ADC quantization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeasonalParams {
    pub baseline: f64,
    pub ar_coeff: f64,
    pub noise_scale: f64,
    pub drift_scale: f64,
    pub trend_rate: f64,
    pub fast_period: f64,
    pub fast_amplitude: f64,
    pub slow_period: f64,
    pub slow_amplitude: f64,
    pub spike_probability: f64,
    pub spike_mean: f64,
    pub spike_sigma: f64,
    /// ADC resolution; every output is a multiple of this step
    pub adc_step: f64,
}

impl Default for SeasonalParams {
    fn default() -> Self {
        Self {
            baseline: 10.0,
            ar_coeff: 0.90,
            noise_scale: 0.2,
            drift_scale: 0.0005,
            trend_rate: 0.0001,
            fast_period: 60.0,
            fast_amplitude: 0.3,
            slow_period: 1440.0,
            slow_amplitude: 1.0,
            spike_probability: 0.001,
            spike_mean: 5.0,
            spike_sigma: 3.0,
            adc_step: 0.01,
        }
    }
}

/// Signal model of a simulated sensor.
///
/// Serialized with a `kind` tag, e.g. `{"kind": "constant", "target": 20.0}`. Omitted
/// parameters take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SignalModel {
    Constant(ConstantParams),
    Gaussian(GaussianParams),
    Cosine(CosineParams),
    Seasonal(SeasonalParams),
}

impl SignalModel {
    /// Constant model with the given target and noise amplitude.
    pub fn constant(target: f64, noise: f64) -> Self {
        SignalModel::Constant(ConstantParams { target, noise })
    }

    /// Gaussian model with the given mean and standard deviation.
    pub fn gaussian(mean: f64, sigma: f64) -> Self {
        SignalModel::Gaussian(GaussianParams { mean, sigma })
    }

    /// Model name as used in the `kind` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            SignalModel::Constant(_) => "constant",
            SignalModel::Gaussian(_) => "gaussian",
            SignalModel::Cosine(_) => "cosine",
            SignalModel::Seasonal(_) => "seasonal",
        }
    }

    /// Check every parameter of the model.
    pub fn validate(&self) -> Result<(), SensorError> {
        match self {
            SignalModel::Constant(p) => {
                finite("target", p.target)?;
                non_negative("noise", p.noise)
            }
            SignalModel::Gaussian(p) => {
                finite("mean", p.mean)?;
                non_negative("sigma", p.sigma)
            }
            SignalModel::Cosine(p) => {
                finite("amplitude", p.amplitude)?;
                positive("period", p.period)?;
                non_negative("noise", p.noise)?;
                non_negative("drift_scale", p.drift_scale)
            }
            SignalModel::Seasonal(p) => {
                finite("baseline", p.baseline)?;
                finite("ar_coeff", p.ar_coeff)?;
                if p.ar_coeff.abs() >= 1.0 {
                    return Err(SensorError::InvalidParameter {
                        parameter: "ar_coeff",
                        reason: format!("{} makes the AR(1) process unstable", p.ar_coeff),
                    });
                }
                non_negative("noise_scale", p.noise_scale)?;
                non_negative("drift_scale", p.drift_scale)?;
                finite("trend_rate", p.trend_rate)?;
                positive("fast_period", p.fast_period)?;
                finite("fast_amplitude", p.fast_amplitude)?;
                positive("slow_period", p.slow_period)?;
                finite("slow_amplitude", p.slow_amplitude)?;
                if !(0.0..=1.0).contains(&p.spike_probability) {
                    return Err(SensorError::InvalidParameter {
                        parameter: "spike_probability",
                        reason: format!("{} is not within [0, 1]", p.spike_probability),
                    });
                }
                finite("spike_mean", p.spike_mean)?;
                non_negative("spike_sigma", p.spike_sigma)?;
                positive("adc_step", p.adc_step)
            }
        }
    }
}

fn finite(parameter: &'static str, value: f64) -> Result<(), SensorError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(SensorError::InvalidParameter {
            parameter,
            reason: format!("{} is not finite", value),
        })
    }
}

fn non_negative(parameter: &'static str, value: f64) -> Result<(), SensorError> {
    finite(parameter, value)?;
    if value < 0.0 {
        return Err(SensorError::InvalidParameter {
            parameter,
            reason: format!("{} must not be negative", value),
        });
    }
    Ok(())
}

fn positive(parameter: &'static str, value: f64) -> Result<(), SensorError> {
    finite(parameter, value)?;
    if value <= 0.0 {
        return Err(SensorError::InvalidParameter {
            parameter,
            reason: format!("{} must be greater than 0", value),
        });
    }
    Ok(())
}

/// Running state of a model, advanced once per read.
#[derive(Debug, Clone, Default, PartialEq)]
struct ModelState {
    tick: u64,
    noise_prev: f64,
    drift: f64,
}

/// A named simulated sensor.
#[derive(Debug, Clone)]
pub struct Sensor {
    name: String,
    model: SignalModel,
    state: ModelState,
    rng: StdRng,
}

impl Sensor {
    /// Create a sensor seeded from OS entropy.
    pub fn new(name: impl Into<String>, model: SignalModel) -> Result<Self, SensorError> {
        Self::build(name.into(), model, StdRng::from_entropy())
    }

    /// Create a sensor with a fixed seed; the same seed always yields the same sequence.
    pub fn with_seed(
        name: impl Into<String>,
        model: SignalModel,
        seed: u64,
    ) -> Result<Self, SensorError> {
        Self::build(name.into(), model, StdRng::seed_from_u64(seed))
    }

    fn build(name: String, model: SignalModel, rng: StdRng) -> Result<Self, SensorError> {
        if name.trim().is_empty() {
            return Err(SensorError::EmptyName);
        }
        model.validate()?;

        Ok(Self {
            name,
            model,
            state: ModelState::default(),
            rng,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn model(&self) -> &SignalModel {
        &self.model
    }

    /// Number of reads performed so far.
    pub fn ticks(&self) -> u64 {
        self.state.tick
    }

    /// Advance the model by one step and return the new value.
    ///
    /// The result is always finite: NaN becomes `0.0` and magnitudes are clamped to
    /// [`READING_LIMIT`].
    pub fn read(&mut self) -> f64 {
        let value = match &self.model {
            SignalModel::Constant(p) => p.target + p.noise * self.rng.gen::<f64>(),
            SignalModel::Gaussian(p) => p.mean + p.sigma * standard_normal(&mut self.rng),
            SignalModel::Cosine(p) => next_cosine(p, &mut self.state, &mut self.rng),
            SignalModel::Seasonal(p) => next_seasonal(p, &mut self.state, &mut self.rng),
        };

        bound(value)
    }
}

fn standard_normal(rng: &mut StdRng) -> f64 {
    rng.sample::<f64, _>(StandardNormal)
}

fn next_cosine(p: &CosineParams, state: &mut ModelState, rng: &mut StdRng) -> f64 {
    let t = state.tick as f64;

    let base = p.amplitude * (2.0 * PI * t / p.period).cos();
    let noise = p.noise * standard_normal(rng);
    state.drift += p.drift_scale * standard_normal(rng);

    state.tick += 1;
    base + noise + state.drift
}

/// Draw order per tick: AR innovation, drift step, spike trial, spike size (only on a hit).
fn next_seasonal(p: &SeasonalParams, state: &mut ModelState, rng: &mut StdRng) -> f64 {
    let t = state.tick as f64;

    let trend = p.trend_rate * t;
    let seasonal = p.slow_amplitude * (2.0 * PI * t / p.slow_period).sin()
        + p.fast_amplitude * (2.0 * PI * t / p.fast_period).sin();

    let eps = p.noise_scale * standard_normal(rng);
    let noise = p.ar_coeff * state.noise_prev + eps;
    state.noise_prev = noise;

    state.drift += p.drift_scale * standard_normal(rng);

    let mut value = p.baseline + trend + seasonal + noise + state.drift;

    if rng.gen::<f64>() < p.spike_probability {
        value += p.spike_mean + p.spike_sigma * standard_normal(rng);
    }

    state.tick += 1;
    (value / p.adc_step).round() * p.adc_step
}

fn bound(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(-READING_LIMIT, READING_LIMIT)
    }
}
