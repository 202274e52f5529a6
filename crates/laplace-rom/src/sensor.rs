//! Per-sensor privacy budget accounting
//!
//! Each registered sensor holds a depletable budget. A query that the budget
//! can pay for releases a fresh noised reading; a query it cannot pay for
//! returns the previously released value, so no new information leaks.
//! Replenishment clock pulses restore the budget at a fixed rate.
//!
//! # State machine
//!
//! ```text
//! REPLENISHED --query--> CONSUMING --query--> EXHAUSTED
//!      ^                     |                    |
//!      +---- rep_clock (snap to budget_max) ------+
//! ```
//!
//! The read bit of a sensor is set by a successful query and cleared only
//! when a clock pulse restores the budget to `budget_max`.
//!
//! [`BudgetManager`] owns every sensor and the read bitfield. It is not
//! internally synchronised: wrap it in a `Mutex` when several threads query
//! sensors, which makes the check, deduct and cache sequence one critical
//! section.

use crate::rng::LaplaceRng;
use crate::urng::UniformSource;
use crate::{LaplaceRomError, Result};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Identifier assigned at registration, never reused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SensorId(usize);

impl SensorId {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl std::fmt::Display for SensorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sensor#{}", self.0)
    }
}

/// Static description of a sensor and its privacy parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorSpec {
    /// Minimum sensor output
    pub minimum: f64,
    /// Maximum sensor output
    pub maximum: f64,
    /// Privacy budget (units of ε)
    pub budget_max: f64,
    /// Budget restored per replenishment pulse
    pub rep_rate: f64,
    /// Privacy factor, smaller is more private
    pub epsilon: f64,
}

impl SensorSpec {
    /// Create a spec; `minimum` and `maximum` may be given in either order
    pub fn new(
        minimum: f64,
        maximum: f64,
        budget_max: f64,
        rep_rate: f64,
        epsilon: f64,
    ) -> Result<Self> {
        if !minimum.is_finite() || !maximum.is_finite() {
            return Err(LaplaceRomError::Configuration(
                "Sensor range must be finite".to_string(),
            ));
        }
        if !budget_max.is_finite() || budget_max < 0.0 {
            return Err(LaplaceRomError::Configuration(format!(
                "budget_max must be a non-negative number, got {}",
                budget_max
            )));
        }
        if !rep_rate.is_finite() || rep_rate < 0.0 {
            return Err(LaplaceRomError::Configuration(format!(
                "rep_rate must be a non-negative number, got {}",
                rep_rate
            )));
        }
        if !epsilon.is_finite() || epsilon <= 0.0 {
            return Err(LaplaceRomError::Configuration(format!(
                "epsilon must be positive, got {}",
                epsilon
            )));
        }
        Ok(SensorSpec {
            minimum: minimum.min(maximum),
            maximum: minimum.max(maximum),
            budget_max,
            rep_rate,
            epsilon,
        })
    }

    /// Width of the output range (`d` in the Laplace mechanism)
    pub fn range(&self) -> f64 {
        self.maximum - self.minimum
    }
}

/// Read bits of all registered sensors, indexed by [`SensorId`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadBitfield {
    bits: Vec<bool>,
}

impl ReadBitfield {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self) -> SensorId {
        self.bits.push(false);
        SensorId(self.bits.len() - 1)
    }

    pub fn set(&mut self, id: SensorId) {
        if let Some(bit) = self.bits.get_mut(id.0) {
            *bit = true;
        }
    }

    pub fn clear(&mut self, id: SensorId) {
        if let Some(bit) = self.bits.get_mut(id.0) {
            *bit = false;
        }
    }

    /// Unknown ids read as clear
    pub fn is_set(&self, id: SensorId) -> bool {
        self.bits.get(id.0).copied().unwrap_or(false)
    }

    /// Number of sensors with unrecovered budget consumption
    pub fn count_set(&self) -> usize {
        self.bits.iter().filter(|&&b| b).count()
    }

    pub fn len(&self) -> usize {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }
}

/// Mutable budget state of one sensor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorBudget {
    budget: f64,
    budget_max: f64,
    rep_rate: f64,
    /// Most recently released reading
    last_value: f64,
}

impl SensorBudget {
    /// Full budget, last value 0
    pub fn new(budget_max: f64, rep_rate: f64) -> Self {
        SensorBudget {
            budget: budget_max,
            budget_max,
            rep_rate,
            last_value: 0.0,
        }
    }

    pub fn budget(&self) -> f64 {
        self.budget
    }

    pub fn budget_max(&self) -> f64 {
        self.budget_max
    }

    pub fn rep_rate(&self) -> f64 {
        self.rep_rate
    }

    pub fn last_value(&self) -> f64 {
        self.last_value
    }

    pub fn is_full(&self) -> bool {
        self.budget >= self.budget_max
    }

    /// Whether the remaining budget strictly exceeds `loss`
    pub fn can_afford(&self, loss: f64) -> bool {
        self.budget > loss
    }

    /// Deduct `loss` if the remaining budget strictly exceeds it
    pub fn try_consume(&mut self, loss: f64) -> bool {
        if self.can_afford(loss) {
            self.budget -= loss;
            true
        } else {
            false
        }
    }

    /// Apply `pulses` replenishment pulses
    ///
    /// Returns `true` when the budget snapped back to `budget_max`.
    pub fn replenish(&mut self, pulses: u64) -> bool {
        let increase = pulses as f64 * self.rep_rate;
        if self.budget < self.budget_max - increase {
            self.budget += increase;
            false
        } else {
            self.budget = self.budget_max;
            true
        }
    }

    /// Spend the whole budget
    pub fn drain(&mut self) {
        self.budget = 0.0;
    }

    fn release(&mut self, value: f64) -> f64 {
        self.last_value = value;
        value
    }
}

/// A registered sensor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sensor {
    id: SensorId,
    spec: SensorSpec,
    budget: SensorBudget,
}

impl Sensor {
    pub fn id(&self) -> SensorId {
        self.id
    }

    pub fn spec(&self) -> &SensorSpec {
        &self.spec
    }

    pub fn budget(&self) -> &SensorBudget {
        &self.budget
    }
}

/// Decides the cost of a query and the noise added to its answer
pub trait PrivacyPolicy {
    /// Budget consumed by one query against `spec`, `>= 0`
    fn privacy_loss(&self, spec: &SensorSpec) -> f64;

    /// Noise added to a released reading
    fn sample_noise(&mut self, spec: &SensorSpec) -> Result<f64>;
}

/// Constant cost per query, no noise
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedCostPolicy {
    pub cost: f64,
}

impl FixedCostPolicy {
    pub fn new(cost: f64) -> Self {
        FixedCostPolicy { cost }
    }
}

impl PrivacyPolicy for FixedCostPolicy {
    fn privacy_loss(&self, _spec: &SensorSpec) -> f64 {
        self.cost
    }

    fn sample_noise(&mut self, _spec: &SensorSpec) -> Result<f64> {
        Ok(0.0)
    }
}

/// Laplace(0, d/ε) noise drawn from the ROM sampler, constant cost per query
#[derive(Debug, Clone)]
pub struct RomNoisePolicy<S> {
    rng: LaplaceRng<S>,
    cost: f64,
}

impl<S: UniformSource> RomNoisePolicy<S> {
    pub fn new(rng: LaplaceRng<S>, cost: f64) -> Self {
        RomNoisePolicy { rng, cost }
    }

    pub fn rng(&self) -> &LaplaceRng<S> {
        &self.rng
    }
}

impl<S: UniformSource> PrivacyPolicy for RomNoisePolicy<S> {
    fn privacy_loss(&self, _spec: &SensorSpec) -> f64 {
        self.cost
    }

    fn sample_noise(&mut self, spec: &SensorSpec) -> Result<f64> {
        self.rng.sample_scaled(spec.range() / spec.epsilon)
    }
}

/// True measurement of a sensor
pub trait SignalSource {
    fn read(&mut self, spec: &SensorSpec) -> f64;
}

/// Simulated hardware sensor reading uniformly within its range
#[derive(Debug, Clone)]
pub struct UniformSignal {
    rng: ChaCha20Rng,
}

impl UniformSignal {
    /// Seeded when `seed` is given, OS entropy otherwise
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(s) => ChaCha20Rng::seed_from_u64(s),
            None => ChaCha20Rng::from_entropy(),
        };
        UniformSignal { rng }
    }
}

impl SignalSource for UniformSignal {
    fn read(&mut self, spec: &SensorSpec) -> f64 {
        spec.minimum + spec.range() * self.rng.gen::<f64>()
    }
}

/// Registry of sensors and their read bits
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BudgetManager {
    sensors: Vec<Sensor>,
    read_bits: ReadBitfield,
}

impl BudgetManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a sensor with a full budget
    pub fn register(&mut self, spec: SensorSpec) -> SensorId {
        let id = self.read_bits.push();
        self.sensors.push(Sensor {
            id,
            spec,
            budget: SensorBudget::new(spec.budget_max, spec.rep_rate),
        });
        debug!(%id, budget_max = spec.budget_max, "registered sensor");
        id
    }

    pub fn len(&self) -> usize {
        self.sensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sensors.is_empty()
    }

    pub fn sensor(&self, id: SensorId) -> Result<&Sensor> {
        self.sensors
            .get(id.0)
            .ok_or(LaplaceRomError::UnknownSensor(id.0))
    }

    fn sensor_mut(&mut self, id: SensorId) -> Result<&mut Sensor> {
        self.sensors
            .get_mut(id.0)
            .ok_or(LaplaceRomError::UnknownSensor(id.0))
    }

    pub fn sensors(&self) -> impl Iterator<Item = &Sensor> {
        self.sensors.iter()
    }

    pub fn read_bits(&self) -> &ReadBitfield {
        &self.read_bits
    }

    pub fn is_read(&self, id: SensorId) -> Result<bool> {
        self.sensor(id)?;
        Ok(self.read_bits.is_set(id))
    }

    pub fn budget(&self, id: SensorId) -> Result<f64> {
        Ok(self.sensor(id)?.budget.budget())
    }

    /// Query a sensor
    ///
    /// Pays `policy.privacy_loss` from the budget and releases a fresh
    /// noised reading when the budget strictly exceeds the loss; otherwise
    /// returns the last released value unchanged.
    ///
    /// A negative or non-finite loss is rejected without touching the budget.
    pub fn query<P, G>(&mut self, id: SensorId, policy: &mut P, signal: &mut G) -> Result<f64>
    where
        P: PrivacyPolicy + ?Sized,
        G: SignalSource + ?Sized,
    {
        let sensor = self.sensor_mut(id)?;
        let loss = policy.privacy_loss(&sensor.spec);
        if !loss.is_finite() || loss < 0.0 {
            return Err(LaplaceRomError::Configuration(format!(
                "privacy loss must be a finite non-negative number, got {}",
                loss
            )));
        }

        if !sensor.budget.can_afford(loss) {
            warn!(
                %id,
                budget = sensor.budget.budget(),
                loss,
                "insufficient privacy budget, returning cached value"
            );
            return Ok(sensor.budget.last_value());
        }

        // Budget is only spent once the noise is in hand
        let noise = policy.sample_noise(&sensor.spec)?;
        let paid = sensor.budget.try_consume(loss);
        debug_assert!(paid);
        let value = signal.read(&sensor.spec) + noise;
        let value = sensor.budget.release(value);
        self.read_bits.set(id);
        Ok(value)
    }

    /// Apply `pulses` replenishment pulses to one sensor
    pub fn rep_clock(&mut self, id: SensorId, pulses: u64) -> Result<()> {
        let sensor = self.sensor_mut(id)?;
        if sensor.budget.replenish(pulses) {
            self.read_bits.clear(id);
        }
        Ok(())
    }

    /// Apply `pulses` replenishment pulses to every sensor
    pub fn rep_clock_all(&mut self, pulses: u64) {
        for sensor in &mut self.sensors {
            if sensor.budget.replenish(pulses) {
                self.read_bits.clear(sensor.id);
            }
        }
    }

    /// Revoke the whole budget of a sensor until it is replenished
    pub fn drain(&mut self, id: SensorId) -> Result<()> {
        self.sensor_mut(id)?.budget.drain();
        self.read_bits.set(id);
        Ok(())
    }
}
