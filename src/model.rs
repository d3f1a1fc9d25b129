use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredMatch {
    #[serde(alias = "_id")]
    pub match_id: String,
    pub league_id: String,
    #[serde(default)]
    pub league_name: String,
    pub match_round_number: i64,
    #[serde(default)]
    pub match_date: String,
    #[serde(default)]
    pub match_hour: String,
    pub home_team_name: String,
    #[serde(default)]
    pub home_team_url: String,
    pub away_team_name: String,
    #[serde(default)]
    pub away_team_url: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Fixture {
    pub match_id: String,
    pub league_id: String,
    pub home_team_name: String,
    pub away_team_name: String,
    pub home_team_url: String,
    pub away_team_url: String,
}

impl From<&StoredMatch> for Fixture {
    fn from(m: &StoredMatch) -> Self {
        Self {
            match_id: m.match_id.clone(),
            league_id: m.league_id.clone(),
            home_team_name: m.home_team_name.clone(),
            away_team_name: m.away_team_name.clone(),
            home_team_url: m.home_team_url.clone(),
            away_team_url: m.away_team_url.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriorMatchRef {
    pub match_id: String,
    pub league_id: String,
    pub home_team_name: String,
    pub away_team_name: String,
    pub home_team_prior_match_ids: Vec<String>,
    pub away_team_prior_match_ids: Vec<String>,
}

/// Statistic name to observed values, in first-seen order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatSeries {
    entries: Vec<(String, Vec<String>)>,
}

impl StatSeries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, stat: &str, value: impl Into<String>) {
        let value = value.into();
        match self.entries.iter_mut().find(|(name, _)| name == stat) {
            Some((_, values)) => values.push(value),
            None => self.entries.push((stat.to_string(), vec![value])),
        }
    }

    pub fn merge(&mut self, stats: &StatMap) {
        for (stat, value) in stats.iter() {
            self.append(stat, value);
        }
    }

    pub fn get(&self, stat: &str) -> Option<&[String]> {
        self.entries
            .iter()
            .find(|(name, _)| name == stat)
            .map(|(_, values)| values.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries
            .iter()
            .map(|(name, values)| (name.as_str(), values.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for StatSeries {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, values) in &self.entries {
            map.serialize_entry(name, values)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for StatSeries {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct SeriesVisitor;

        impl<'de> Visitor<'de> for SeriesVisitor {
            type Value = StatSeries;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of statistic name to value list")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<StatSeries, A::Error> {
                let mut series = StatSeries::new();
                while let Some((name, values)) = access.next_entry::<String, Vec<String>>()? {
                    for value in values {
                        series.append(&name, value);
                    }
                }
                Ok(series)
            }
        }

        deserializer.deserialize_map(SeriesVisitor)
    }
}

/// Statistics read from one historical match page, for one team, in row order.
/// Rows sharing a label are all kept.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatMap {
    rows: Vec<(String, String)>,
}

impl StatMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, stat: impl Into<String>, value: impl Into<String>) {
        self.rows.push((stat.into(), value.into()));
    }

    pub fn get(&self, stat: &str) -> Option<&str> {
        self.rows
            .iter()
            .find(|(name, _)| name == stat)
            .map(|(_, value)| value.as_str())
    }

    pub fn get_all(&self, stat: &str) -> Vec<&str> {
        self.rows
            .iter()
            .filter(|(name, _)| name == stat)
            .map(|(_, value)| value.as_str())
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.rows
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for StatMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = StatMap::new();
        for (k, v) in iter {
            map.push(k, v);
        }
        map
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Home,
    Away,
}

impl Side {
    pub fn label(self) -> &'static str {
        match self {
            Side::Home => "home",
            Side::Away => "away",
        }
    }
}

/// Record under construction. Only the aggregation engine holds one.
#[derive(Debug)]
pub struct AggregatedStatsBuilder {
    inner: AggregatedStats,
}

impl AggregatedStatsBuilder {
    pub fn new(prior: &PriorMatchRef) -> Self {
        Self {
            inner: AggregatedStats {
                match_id: prior.match_id.clone(),
                league_id: prior.league_id.clone(),
                home_team_name: prior.home_team_name.clone(),
                away_team_name: prior.away_team_name.clone(),
                home_team_prior_match_stats: StatSeries::new(),
                away_team_prior_match_stats: StatSeries::new(),
            },
        }
    }

    pub fn merge(&mut self, side: Side, stats: &StatMap) {
        match side {
            Side::Home => self.inner.home_team_prior_match_stats.merge(stats),
            Side::Away => self.inner.away_team_prior_match_stats.merge(stats),
        }
    }

    pub fn seal(self) -> AggregatedStats {
        self.inner
    }
}

/// Sealed per-fixture aggregate. Read-only once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedStats {
    match_id: String,
    league_id: String,
    home_team_name: String,
    away_team_name: String,
    home_team_prior_match_stats: StatSeries,
    away_team_prior_match_stats: StatSeries,
}

impl AggregatedStats {
    pub(crate) fn restore(
        match_id: String,
        league_id: String,
        home_team_name: String,
        away_team_name: String,
        home_team_prior_match_stats: StatSeries,
        away_team_prior_match_stats: StatSeries,
    ) -> Self {
        Self {
            match_id,
            league_id,
            home_team_name,
            away_team_name,
            home_team_prior_match_stats,
            away_team_prior_match_stats,
        }
    }

    pub fn match_id(&self) -> &str {
        &self.match_id
    }

    pub fn league_id(&self) -> &str {
        &self.league_id
    }

    pub fn home_team_name(&self) -> &str {
        &self.home_team_name
    }

    pub fn away_team_name(&self) -> &str {
        &self.away_team_name
    }

    pub fn home_team_prior_match_stats(&self) -> &StatSeries {
        &self.home_team_prior_match_stats
    }

    pub fn away_team_prior_match_stats(&self) -> &StatSeries {
        &self.away_team_prior_match_stats
    }

    pub fn stats_for(&self, side: Side) -> &StatSeries {
        match side {
            Side::Home => &self.home_team_prior_match_stats,
            Side::Away => &self.away_team_prior_match_stats,
        }
    }

    pub fn display_name(&self) -> String {
        format!("{} - {}", self.home_team_name, self.away_team_name)
    }
}
