//! Static player reference data.

use crate::types::{PlayerSeed, PlayerStats};
use std::path::Path;
use thiserror::Error;
use tracing::info;

/// Roster loading errors.
#[derive(Debug, Error)]
pub enum RosterError {
    #[error("Failed to read roster file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid roster file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Roster is empty")]
    Empty,
}

// (id, name, team, position, base price, volatility, ppg, rpg, apg)
const DEFAULT_ROSTER: &[(&str, &str, &str, &str, f64, f64, f64, f64, f64)] = &[
    ("lebron-james", "LeBron James", "LAL", "SF", 185.0, 0.04, 25.7, 7.3, 8.3),
    ("stephen-curry", "Stephen Curry", "GSW", "PG", 178.0, 0.05, 26.4, 4.5, 5.1),
    ("nikola-jokic", "Nikola Jokic", "DEN", "C", 210.0, 0.03, 26.4, 12.4, 9.0),
    ("giannis-antetokounmpo", "Giannis Antetokounmpo", "MIL", "PF", 195.0, 0.04, 30.4, 11.5, 6.5),
    ("luka-doncic", "Luka Doncic", "DAL", "PG", 200.0, 0.05, 33.9, 9.2, 9.8),
    ("jayson-tatum", "Jayson Tatum", "BOS", "SF", 165.0, 0.04, 26.9, 8.1, 4.9),
    ("joel-embiid", "Joel Embiid", "PHI", "C", 170.0, 0.07, 34.7, 11.0, 5.6),
    ("shai-gilgeous-alexander", "Shai Gilgeous-Alexander", "OKC", "SG", 188.0, 0.05, 30.1, 5.5, 6.2),
    ("anthony-edwards", "Anthony Edwards", "MIN", "SG", 150.0, 0.06, 25.9, 5.4, 5.1),
    ("kevin-durant", "Kevin Durant", "PHX", "SF", 160.0, 0.04, 27.1, 6.6, 5.0),
    ("victor-wembanyama", "Victor Wembanyama", "SAS", "C", 140.0, 0.08, 21.4, 10.6, 3.9),
    ("tyrese-haliburton", "Tyrese Haliburton", "IND", "PG", 120.0, 0.06, 20.1, 3.9, 10.9),
];

/// The roster compiled into the binary.
pub fn default_roster() -> Vec<PlayerSeed> {
    DEFAULT_ROSTER
        .iter()
        .map(
            |&(id, name, team, position, base_price, volatility, points, rebounds, assists)| {
                PlayerSeed {
                    id: id.to_string(),
                    name: name.to_string(),
                    team: team.to_string(),
                    position: position.to_string(),
                    base_price,
                    volatility,
                    stats: PlayerStats {
                        points,
                        rebounds,
                        assists,
                    },
                }
            },
        )
        .collect()
}

/// Parse a roster from a JSON array of player seeds.
pub fn parse_roster(json: &str) -> Result<Vec<PlayerSeed>, RosterError> {
    let seeds: Vec<PlayerSeed> = serde_json::from_str(json)?;
    if seeds.is_empty() {
        return Err(RosterError::Empty);
    }
    Ok(seeds)
}

/// Load the roster from `path`, or the built-in roster when no path is given.
pub fn load_roster(path: Option<&Path>) -> Result<Vec<PlayerSeed>, RosterError> {
    match path {
        Some(path) => {
            let contents = std::fs::read_to_string(path)?;
            let seeds = parse_roster(&contents)?;
            info!("Loaded {} players from {}", seeds.len(), path.display());
            Ok(seeds)
        }
        None => Ok(default_roster()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_roster_is_valid() {
        let roster = default_roster();
        assert!(!roster.is_empty());
        for seed in &roster {
            assert!(seed.base_price >= 10.0);
            assert!(seed.volatility > 0.0 && seed.volatility < 1.0);
        }
    }

    #[test]
    fn test_parse_roster() {
        let json = r#"[{"id":"x","name":"X","team":"T","position":"C","basePrice":42.0,"volatility":0.2}]"#;
        let seeds = parse_roster(json).unwrap();
        assert_eq!(seeds.len(), 1);
        assert_eq!(seeds[0].base_price, 42.0);
        assert_eq!(seeds[0].stats.points, 0.0);
    }

    #[test]
    fn test_parse_empty_roster() {
        assert!(matches!(parse_roster("[]"), Err(RosterError::Empty)));
        assert!(matches!(parse_roster("{"), Err(RosterError::Parse(_))));
    }

    #[test]
    fn test_load_without_path() {
        assert_eq!(load_roster(None).unwrap().len(), default_roster().len());
    }
}
