//! Team label → exchange abbreviation tables.
//!
//! Prediction rows carry full team names ("New York Yankees") while
//! exchange tickers embed abbreviations ("NYY"). Lookups are
//! case-insensitive; configured overrides win over built-in entries.

use std::collections::HashMap;

use common::League;

const MLB_TEAMS: &[(&str, &str)] = &[
    ("Los Angeles Angels", "LAA"),
    ("Arizona Diamondbacks", "ARI"),
    ("Baltimore Orioles", "BAL"),
    ("Boston Red Sox", "BOS"),
    ("Chicago Cubs", "CHC"),
    ("Cincinnati Reds", "CIN"),
    ("Cleveland Guardians", "CLE"),
    ("Colorado Rockies", "COL"),
    ("Detroit Tigers", "DET"),
    ("Houston Astros", "HOU"),
    ("Kansas City Royals", "KC"),
    ("Los Angeles Dodgers", "LAD"),
    ("Washington Nationals", "WSH"),
    ("New York Mets", "NYM"),
    ("Oakland Athletics", "OAK"),
    ("Pittsburgh Pirates", "PIT"),
    ("San Diego Padres", "SD"),
    ("Seattle Mariners", "SEA"),
    ("San Francisco Giants", "SF"),
    ("St. Louis Cardinals", "STL"),
    ("Tampa Bay Rays", "TB"),
    ("Texas Rangers", "TEX"),
    ("Toronto Blue Jays", "TOR"),
    ("Minnesota Twins", "MIN"),
    ("Philadelphia Phillies", "PHI"),
    ("Atlanta Braves", "ATL"),
    ("Chicago White Sox", "CWS"),
    ("Miami Marlins", "MIA"),
    ("New York Yankees", "NYY"),
    ("Milwaukee Brewers", "MIL"),
];

/// (abbreviation, full name, short display name)
const NBA_TEAMS: &[(&str, &str, &str)] = &[
    ("ATL", "Atlanta Hawks", "Hawks"),
    ("BOS", "Boston Celtics", "Celtics"),
    ("BKN", "Brooklyn Nets", "Nets"),
    ("CHA", "Charlotte Hornets", "Hornets"),
    ("CHI", "Chicago Bulls", "Bulls"),
    ("CLE", "Cleveland Cavaliers", "Cavaliers"),
    ("DAL", "Dallas Mavericks", "Mavericks"),
    ("DEN", "Denver Nuggets", "Nuggets"),
    ("DET", "Detroit Pistons", "Pistons"),
    ("GSW", "Golden State Warriors", "Warriors"),
    ("HOU", "Houston Rockets", "Rockets"),
    ("IND", "Indiana Pacers", "Pacers"),
    ("LAC", "Los Angeles Clippers", "Clippers"),
    ("LAL", "Los Angeles Lakers", "Lakers"),
    ("MEM", "Memphis Grizzlies", "Grizzlies"),
    ("MIA", "Miami Heat", "Heat"),
    ("MIL", "Milwaukee Bucks", "Bucks"),
    ("MIN", "Minnesota Timberwolves", "Timberwolves"),
    ("NOP", "New Orleans Pelicans", "Pelicans"),
    ("NYK", "New York Knicks", "Knicks"),
    ("OKC", "Oklahoma City Thunder", "Thunder"),
    ("ORL", "Orlando Magic", "Magic"),
    ("PHI", "Philadelphia 76ers", "76ers"),
    ("PHX", "Phoenix Suns", "Suns"),
    ("POR", "Portland Trail Blazers", "Trail Blazers"),
    ("SAC", "Sacramento Kings", "Kings"),
    ("SAS", "San Antonio Spurs", "Spurs"),
    ("TOR", "Toronto Raptors", "Raptors"),
    ("UTA", "Utah Jazz", "Jazz"),
    ("WAS", "Washington Wizards", "Wizards"),
];

fn key(label: &str) -> String {
    label.trim().to_lowercase()
}

/// Resolves prediction team labels to exchange abbreviations.
#[derive(Debug, Clone, Default)]
pub struct TeamTable {
    by_label: HashMap<String, String>,
}

impl TeamTable {
    /// Built-in table for `league`. Abbreviations map to themselves.
    pub fn for_league(league: League) -> Self {
        let mut table = Self::default();
        match league {
            League::Mlb => {
                for (name, abbr) in MLB_TEAMS {
                    table.insert(name, abbr);
                    table.insert(abbr, abbr);
                }
            }
            League::Nba => {
                for (abbr, full, short) in NBA_TEAMS {
                    table.insert(full, abbr);
                    table.insert(short, abbr);
                    table.insert(abbr, abbr);
                }
            }
        }
        table
    }

    /// Layer user overrides on top of the built-in entries.
    pub fn with_overrides(mut self, overrides: &HashMap<String, String>) -> Self {
        for (label, abbr) in overrides {
            self.insert(label, abbr);
        }
        self
    }

    pub fn insert(&mut self, label: &str, abbreviation: &str) {
        self.by_label
            .insert(key(label), abbreviation.trim().to_uppercase());
    }

    /// Exchange abbreviation for `label`, or `None` if unknown.
    pub fn abbreviation(&self, label: &str) -> Option<&str> {
        self.by_label.get(&key(label)).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.by_label.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_label.is_empty()
    }
}
