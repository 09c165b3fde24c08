//! Majority-vote fusion of indicator votes.

use std::collections::BTreeMap;

use serde::Serialize;

use super::indicators::Indicator;
use crate::models::{PriceSeries, SignalVote};

/// Counts of each vote in one evaluation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct VoteTally {
    pub buy: usize,
    pub sell: usize,
    pub hold: usize,
}

impl VoteTally {
    pub fn from_votes<I>(votes: I) -> Self
    where
        I: IntoIterator<Item = SignalVote>,
    {
        votes.into_iter().fold(Self::default(), |mut tally, vote| {
            match vote {
                SignalVote::Buy => tally.buy += 1,
                SignalVote::Sell => tally.sell += 1,
                SignalVote::Hold => tally.hold += 1,
            }
            tally
        })
    }

    /// Resolve the tally to a single vote.
    ///
    /// Hold wins a strict plurality first. Buy needs a strict plurality.
    /// Sell needs a strict plurality and is vetoed when it only ties Hold.
    /// Everything else holds.
    pub fn resolve(&self) -> SignalVote {
        let (b, s, h) = (self.buy, self.sell, self.hold);

        if h > s && h > b {
            SignalVote::Hold
        } else if b > s && b > h {
            SignalVote::Buy
        } else if s > b && s > h {
            if h == s {
                SignalVote::Hold
            } else {
                SignalVote::Sell
            }
        } else {
            SignalVote::Hold
        }
    }
}

/// Computes indicator votes on a price series and fuses them.
#[derive(Debug, Clone)]
pub struct SignalEngine {
    indicators: Vec<Indicator>,
}

impl SignalEngine {
    pub fn new(indicators: Vec<Indicator>) -> Self {
        Self { indicators }
    }

    /// One vote per configured indicator.
    pub fn vote(&self, series: &PriceSeries) -> BTreeMap<Indicator, SignalVote> {
        self.indicators
            .iter()
            .map(|indicator| (*indicator, indicator.evaluate(series.closes())))
            .collect()
    }

    /// Fuse a set of votes by majority.
    pub fn fuse<I>(votes: I) -> SignalVote
    where
        I: IntoIterator<Item = SignalVote>,
    {
        VoteTally::from_votes(votes).resolve()
    }
}

impl Default for SignalEngine {
    fn default() -> Self {
        Self::new(Indicator::CORE.to_vec())
    }
}
