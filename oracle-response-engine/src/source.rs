// Copyright (c) James Kassemi, SC, US. All rights reserved.
use core_types::StatusCode;
use rand::Rng;

/// Supplies the status code every matching oracle reports for one request.
pub trait StatusSource: Send + Sync {
    fn draw(&self) -> StatusCode;
}

/// Uniform draw over the reportable codes using the thread RNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomStatusSource;

impl StatusSource for RandomStatusSource {
    fn draw(&self) -> StatusCode {
        let slot = rand::thread_rng().gen_range(0..StatusCode::REPORTABLE.len());
        StatusCode::REPORTABLE[slot]
    }
}

/// Always reports the same code.
#[derive(Debug, Clone, Copy)]
pub struct FixedStatusSource(pub StatusCode);

impl StatusSource for FixedStatusSource {
    fn draw(&self) -> StatusCode {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn random_source_never_draws_unknown() {
        let source = RandomStatusSource;
        let mut seen = HashSet::new();
        for _ in 0..500 {
            let status = source.draw();
            assert_ne!(status, StatusCode::Unknown);
            seen.insert(status);
        }
        assert_eq!(seen.len(), StatusCode::REPORTABLE.len());
    }
}
