//! Per-phase read budget.

/// Counts platform reads for one phase against what it was allotted.
///
/// `consumed` never exceeds `allotted`: a charge larger than what is left is
/// clamped and the caller is told how much was actually granted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BudgetMeter {
    allotted: u32,
    consumed: u32,
    lookups: u32,
    touched: Vec<String>,
}

impl BudgetMeter {
    pub fn new(allotted: u32) -> Self {
        Self {
            allotted,
            consumed: 0,
            lookups: 0,
            touched: Vec::new(),
        }
    }

    pub fn allotted(&self) -> u32 {
        self.allotted
    }

    pub fn consumed(&self) -> u32 {
        self.consumed
    }

    pub fn remaining(&self) -> u32 {
        self.allotted - self.consumed
    }

    pub fn lookups(&self) -> u32 {
        self.lookups
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining() == 0
    }

    /// Charge up to `reads`; returns the number granted.
    pub fn charge(&mut self, reads: u32) -> u32 {
        let granted = reads.min(self.remaining());
        self.consumed += granted;
        granted
    }

    /// Charge exactly `reads` or nothing.
    pub fn try_charge(&mut self, reads: u32) -> bool {
        if reads > self.remaining() {
            return false;
        }
        self.consumed += reads;
        true
    }

    pub fn record_lookup(&mut self) {
        self.lookups += 1;
    }

    /// Note an id the phase acted on.
    pub fn touch(&mut self, id: impl Into<String>) {
        self.touched.push(id.into());
    }

    pub fn touched(&self) -> &[String] {
        &self.touched
    }

    pub fn into_touched(self) -> Vec<String> {
        self.touched
    }
}
