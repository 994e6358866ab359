//! Shuttle dataset: lines, stops and published schedules.
//!
//! Read-only lookup table. The UFBA "BUZUFBA" network is built in; a JSON file
//! with the same shape (`{"lines": [...], "stops": [...]}`, camelCase keys)
//! can replace it.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::alert::{Direction, ItemType};
use crate::error::{BoraBuzError, Result};

/// A shuttle line with both directions of its route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Line {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub display_name: String,
    /// Outbound stop ids, in travel order.
    #[serde(default)]
    pub route_ida: Vec<String>,
    /// Inbound stop ids, in travel order.
    #[serde(default)]
    pub route_volta: Vec<String>,
    /// Departure times (`HH:MM`).
    #[serde(default)]
    pub schedules: Vec<String>,
}

impl Line {
    pub fn route(&self, direction: Direction) -> &[String] {
        match direction {
            Direction::Outbound => &self.route_ida,
            Direction::Inbound => &self.route_volta,
        }
    }

    /// Zero-based position of `stop_id` in the given direction.
    pub fn stop_index(&self, direction: Direction, stop_id: &str) -> Option<usize> {
        self.route(direction).iter().position(|s| s == stop_id)
    }

    pub fn passes_through(&self, direction: Direction, stop_id: &str) -> bool {
        self.stop_index(direction, stop_id).is_some()
    }

    pub fn serves(&self, stop_id: &str) -> bool {
        Direction::BOTH.iter().any(|d| self.passes_through(*d, stop_id))
    }

    /// Stops between the route's entry point and `stop_id`.
    ///
    /// With a direction: the index in that direction; if the stop only appears
    /// in the opposite direction, that index offset by the requested route's
    /// length. Without one: the outbound occurrence wins and an inbound-only
    /// occurrence is offset by the outbound length. Combined-route indexing,
    /// kept for compatibility with existing messages.
    pub fn stops_until(&self, stop_id: &str, direction: Option<Direction>) -> Option<usize> {
        let first = direction.unwrap_or(Direction::Outbound);
        if let Some(idx) = self.stop_index(first, stop_id) {
            return Some(idx);
        }
        self.stop_index(first.opposite(), stop_id)
            .map(|idx| self.route(first).len() + idx)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stop {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

/// Read-only table of lines and stops. Lookups of unknown ids return `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LineDirectory {
    #[serde(default)]
    pub lines: Vec<Line>,
    #[serde(default)]
    pub stops: Vec<Stop>,
}

impl LineDirectory {
    pub fn new(lines: Vec<Line>, stops: Vec<Stop>) -> Self {
        Self { lines, stops }
    }

    /// Load a dataset from a JSON file.
    pub fn from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            BoraBuzError::Dataset(format!("Failed to read {}: {e}", path.display()))
        })?;
        Self::from_json(&content)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let directory: Self = serde_json::from_str(json)
            .map_err(|e| BoraBuzError::Dataset(format!("Failed to parse dataset: {e}")))?;
        tracing::debug!(
            "🗺️ Dataset loaded: {} lines, {} stops",
            directory.lines.len(),
            directory.stops.len()
        );
        Ok(directory)
    }

    pub fn line(&self, id: &str) -> Option<&Line> {
        self.lines.iter().find(|l| l.id == id)
    }

    pub fn stop(&self, id: &str) -> Option<&Stop> {
        self.stops.iter().find(|s| s.id == id)
    }

    /// Lines serving `stop_id` in either direction, in dataset order.
    pub fn lines_through<'a>(&'a self, stop_id: &'a str) -> impl Iterator<Item = &'a Line> + 'a {
        self.lines.iter().filter(move |l| l.serves(stop_id))
    }

    /// Display name for an item, falling back to its id.
    pub fn item_name(&self, item_type: ItemType, id: &str) -> String {
        match item_type {
            ItemType::Line => self.line(id).map(|l| l.name.clone()),
            ItemType::Stop => self.stop(id).map(|s| s.name.clone()),
        }
        .unwrap_or_else(|| id.to_string())
    }

    /// Published departure times relevant to an item: the line's own
    /// schedule, or the union of schedules of every line serving a stop.
    pub fn schedules_for(&self, item_type: ItemType, id: &str) -> Vec<String> {
        let mut times: Vec<String> = match item_type {
            ItemType::Line => self
                .line(id)
                .map(|l| l.schedules.clone())
                .unwrap_or_default(),
            ItemType::Stop => self
                .lines_through(id)
                .flat_map(|l| l.schedules.iter().cloned())
                .collect(),
        };
        times.sort();
        times.dedup();
        times
    }

    /// The built-in UFBA shuttle network.
    pub fn builtin() -> Self {
        Self::new(builtin_lines(), builtin_stops())
    }
}

fn line(
    id: &str,
    name: &str,
    display_name: &str,
    ida: &[&str],
    volta: &[&str],
    schedules: &[&str],
) -> Line {
    let owned = |v: &[&str]| -> Vec<String> { v.iter().map(|s| s.to_string()).collect() };
    Line {
        id: id.to_string(),
        name: name.to_string(),
        display_name: display_name.to_string(),
        route_ida: owned(ida),
        route_volta: owned(volta),
        schedules: owned(schedules),
    }
}

fn builtin_lines() -> Vec<Line> {
    vec![
        line(
            "b1",
            "B1",
            "São Lázaro - Odontologia",
            &[
                "estacionamento-sao-lazaro",
                "politecnica",
                "arquitetura",
                "residencia-5",
                "campus-vale-canela",
                "isc-canela",
                "odontologia",
            ],
            &[
                "reitoria",
                "creche-canela",
                "graca-r2",
                "faculdade-direito",
                "faced",
                "estacionamento-paf-matematica",
                "proae",
                "politecnica",
                "estacionamento-sao-lazaro",
            ],
            &[
                "06:10", "07:10", "08:10", "09:10", "10:10", "11:10", "12:10", "13:10", "14:10",
                "15:10", "16:10", "17:10", "18:10", "19:10", "20:10", "21:10", "22:10",
            ],
        ),
        line(
            "b2",
            "B2",
            "Ondina - Reitoria",
            &[
                "estacionamento-paf-matematica",
                "av-garibaldi-r5",
                "proae",
                "politecnica",
                "sao-lazaro",
                "creche-canela-acesso",
                "reitoria",
            ],
            &[
                "residencia-1-vitoria",
                "faculdade-direito",
                "isc-nova-parada",
                "odontologia",
                "reitoria",
                "creche-canela",
                "politecnica",
                "sao-lazaro",
                "arquitetura",
                "estacionamento-geociencias",
                "estacionamento-paf-matematica",
            ],
            &[
                "06:00", "07:10", "08:20", "09:30", "10:40", "11:50", "13:00", "14:10", "15:20",
                "16:30", "17:40", "18:50", "20:00", "21:10", "22:20",
            ],
        ),
        line(
            "b3",
            "B3",
            "Ondina - Belas Artes",
            &[
                "estacionamento-paf-matematica",
                "av-garibaldi",
                "campus-vale-canela-economia",
                "avenida-7-setembro",
                "belas-artes",
            ],
            &[
                "reitoria",
                "creche-canela",
                "politecnica",
                "arquitetura",
                "estacionamento-geociencias",
                "estacionamento-paf-matematica",
            ],
            &[
                "06:30", "07:20", "08:10", "09:00", "09:50", "10:40", "11:30", "12:20", "13:10",
                "14:00", "14:50", "15:40", "16:30", "17:20", "18:10", "19:00", "19:50", "20:40",
                "21:30", "22:20",
            ],
        ),
        line(
            "b4",
            "B4",
            "Ondina - Economia",
            &[
                "estacionamento-paf-matematica",
                "av-garibaldi-r5",
                "proae",
                "politecnica",
                "creche-canela",
                "reitoria",
                "rua-direita-piedade",
            ],
            &[
                "piedade",
                "residencia-1-dist-vitoria",
                "graca-r2",
                "sao-lazaro",
                "arquitetura",
                "estacionamento-geociencias",
                "estacionamento-paf-matematica",
            ],
            &[
                "06:50", "08:05", "09:20", "10:35", "11:50", "13:05", "14:20", "15:35", "16:50",
                "18:05", "19:20", "20:35", "21:50",
            ],
        ),
        line(
            "b5",
            "B5",
            "Geociências - Reitoria",
            &[
                "instituto-geociencias",
                "facom",
                "portaria-principal",
                "centro-esportes",
                "av-garibaldi-r5",
                "proae",
                "sao-lazaro",
                "politecnica",
                "creche-canela",
                "reitoria",
            ],
            &[
                "residencia-1-vitoria",
                "faculdade-direito",
                "ics",
                "p-odontologia",
                "reitoria",
                "creche-canela",
                "politecnica",
                "sao-lazaro",
                "arquitetura",
                "facom",
                "instituto-geociencias",
            ],
            &[
                "06:40", "07:55", "09:10", "10:25", "11:40", "12:55", "14:10", "15:25", "16:40",
                "17:55", "19:10", "20:25", "21:40", "22:55",
            ],
        ),
    ]
}

fn builtin_stops() -> Vec<Stop> {
    [
        ("estacionamento-sao-lazaro", "Estacionamento São Lázaro", "Campus São Lázaro"),
        ("politecnica", "Politécnica", "Escola Politécnica"),
        ("arquitetura", "Arquitetura", "Faculdade de Arquitetura"),
        ("residencia-5", "Residência 5", "Residência Universitária"),
        ("campus-vale-canela", "Campus Vale do Canela (Entrada ICS)", "Instituto de Ciências da Saúde"),
        ("isc-canela", "ISC Canela", "Instituto de Ciências da Saúde"),
        ("odontologia", "Odontologia", "Faculdade de Odontologia"),
        ("reitoria", "Reitoria", "Campus Ondina"),
        ("creche-canela", "Creche — Canela", "Creche UFBA"),
        ("graca-r2", "Graça R2 (Delícia)", "Bairro Graça"),
        ("faculdade-direito", "Faculdade de Direito", "Faculdade de Direito"),
        ("faced", "Faced", "Faculdade de Educação"),
        ("estacionamento-paf-matematica", "Estacionamento PAF I (Matemática)", "Campus Ondina"),
        ("proae", "PROAE", "Pró-Reitoria de Assistência Estudantil"),
        ("av-garibaldi-r5", "Av. Garibaldi R5", "Avenida Garibaldi"),
        ("sao-lazaro", "São Lázaro", "Campus São Lázaro"),
        ("creche-canela-acesso", "Creche / Canela/Acesso: ADM / FACED / FMB", "Vale do Canela"),
        ("residencia-1-vitoria", "Residência I - Ponto de Distribuição Vitória", "Residência Universitária"),
        ("isc-nova-parada", "ISC", "Instituto de Ciências da Saúde"),
        ("estacionamento-geociencias", "Estacionamento Geociências", "Instituto de Geociências"),
        ("av-garibaldi", "Av. Garibaldi", "Avenida Garibaldi"),
        ("campus-vale-canela-economia", "Campus Vale do Canela", "Faculdade de Economia"),
        ("avenida-7-setembro", "Avenida 7 de Setembro / Faculdade de Economia", "Faculdade de Economia"),
        ("belas-artes", "Belas Artes", "Escola de Belas Artes"),
        ("rua-direita-piedade", "Rua Direita da Piedade / Faculdade de Economia", "Piedade"),
        ("piedade", "Piedade", "Estação Piedade"),
        ("residencia-1-dist-vitoria", "Residência I - P. de Dist. Vitória", "Residência Universitária"),
        ("instituto-geociencias", "Instituto de Geociências", "Instituto de Geociências"),
        ("facom", "Facom", "Faculdade de Comunicação"),
        ("portaria-principal", "Portaria Principal", "Campus Ondina"),
        ("centro-esportes", "Centro Esportes", "Centro de Esportes UFBA"),
        ("ics", "ICS", "Instituto de Ciências da Saúde"),
        ("p-odontologia", "Odontologia", "Faculdade de Odontologia"),
    ]
    .into_iter()
    .map(|(id, name, location)| Stop {
        id: id.to_string(),
        name: name.to_string(),
        location: Some(location.to_string()),
    })
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_routes_reference_known_stops() {
        let dir = LineDirectory::builtin();
        assert_eq!(dir.lines.len(), 5);
        for line in &dir.lines {
            for d in Direction::BOTH {
                for stop in line.route(d) {
                    assert!(dir.stop(stop).is_some(), "{} {d}: unknown stop {stop}", line.id);
                }
            }
        }
    }

    #[test]
    fn test_stops_until_per_direction() {
        let dir = LineDirectory::builtin();
        let b5 = dir.line("b5").unwrap();
        assert_eq!(b5.stops_until("ics", Some(Direction::Inbound)), Some(2));
        // Only on the inbound route: offset by the outbound length.
        assert_eq!(b5.stops_until("ics", None), Some(b5.route_ida.len() + 2));
        assert_eq!(b5.stops_until("ics", Some(Direction::Outbound)), Some(12));
        assert_eq!(b5.stops_until("nowhere", None), None);
    }

    #[test]
    fn test_outbound_occurrence_wins_when_ambiguous() {
        let dir = LineDirectory::builtin();
        let b1 = dir.line("b1").unwrap();
        // politecnica is index 1 outbound and index 7 inbound
        assert_eq!(b1.stops_until("politecnica", None), Some(1));
        assert_eq!(b1.stops_until("politecnica", Some(Direction::Inbound)), Some(7));
    }

    #[test]
    fn test_lines_through_and_schedules() {
        let dir = LineDirectory::builtin();
        let ids: Vec<&str> = dir.lines_through("reitoria").map(|l| l.id.as_str()).collect();
        assert_eq!(ids, vec!["b1", "b2", "b3", "b4", "b5"]);
        assert!(dir.lines_through("missing").next().is_none());

        let times = dir.schedules_for(ItemType::Stop, "ics");
        assert_eq!(times.first().map(String::as_str), Some("06:40"));
        assert!(dir.schedules_for(ItemType::Line, "b99").is_empty());
        assert_eq!(dir.item_name(ItemType::Line, "b99"), "b99");
    }

    #[test]
    fn test_from_json_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("lines.json");
        std::fs::write(
            &path,
            r#"{"lines":[{"id":"x1","name":"X1","routeIda":["a","b"],"routeVolta":["b","a"],"schedules":["07:00"]}],
               "stops":[{"id":"a","name":"A"},{"id":"b","name":"B"}]}"#,
        )
        .unwrap();
        let dir = LineDirectory::from_path(&path).unwrap();
        assert_eq!(dir.line("x1").unwrap().stops_until("b", None), Some(1));
        assert!(LineDirectory::from_json("not json").is_err());
    }
}
