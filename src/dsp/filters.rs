// Filters using State Variable Filter (SVF) topology.

/// Filter response selected from the SVF outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterType {
    Lowpass,
    Highpass,
}

/// Cytomic (Andrew Simper) state variable filter.
#[derive(Debug, Clone, Copy)]
pub struct SvfFilter {
    filter_type: FilterType,

    // Filter state
    ic1eq: f32,
    ic2eq: f32,

    // Cached coefficients
    k: f32,
    a1: f32,
    a2: f32,
    a3: f32,

    last_cutoff: f32,
    last_resonance: f32,
}

impl SvfFilter {
    pub fn new(filter_type: FilterType) -> Self {
        Self {
            filter_type,
            ic1eq: 0.0,
            ic2eq: 0.0,
            k: 2.0,
            a1: 0.0,
            a2: 0.0,
            a3: 0.0,
            last_cutoff: -1.0,
            last_resonance: -1.0,
        }
    }

    pub fn lowpass() -> Self {
        Self::new(FilterType::Lowpass)
    }

    pub fn highpass() -> Self {
        Self::new(FilterType::Highpass)
    }

    /// Update coefficients; skipped when nothing changed.
    ///
    /// `resonance` is 0..=1; values near 1 approach self-oscillation.
    #[inline]
    pub fn set(&mut self, cutoff: f32, resonance: f32, sample_rate: f32) {
        if cutoff == self.last_cutoff && resonance == self.last_resonance {
            return;
        }
        self.last_cutoff = cutoff;
        self.last_resonance = resonance;

        let cutoff = cutoff.clamp(20.0, (sample_rate * 0.45).max(20.0));
        let resonance = resonance.clamp(0.0, 0.97);

        let g = (std::f32::consts::PI * cutoff / sample_rate).tan();
        self.k = 2.0 - 2.0 * resonance;
        self.a1 = 1.0 / (1.0 + g * (g + self.k));
        self.a2 = g * self.a1;
        self.a3 = g * self.a2;
    }

    #[inline]
    pub fn process(&mut self, input: f32) -> f32 {
        let v3 = input - self.ic2eq;
        let v1 = self.a1 * self.ic1eq + self.a2 * v3;
        let v2 = self.ic2eq + self.a2 * self.ic1eq + self.a3 * v3;

        self.ic1eq = 2.0 * v1 - self.ic1eq;
        self.ic2eq = 2.0 * v2 - self.ic2eq;

        match self.filter_type {
            FilterType::Lowpass => v2,
            FilterType::Highpass => input - self.k * v1 - v2,
        }
    }

    pub fn reset(&mut self) {
        self.ic1eq = 0.0;
        self.ic2eq = 0.0;
    }
}
