//! Sector routing
//!
//! Localities are grouped into administrative sectors, each reviewed by one
//! responsible person. A locality is routed to the first sector in table
//! order that lists it; localities listed nowhere go to the `outros` bucket.

use crate::types::Destination;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Administrative grouping of localities
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sector {
    pub name: String,
    #[serde(default)]
    pub responsible: String,
    pub localities: Vec<String>,
}

impl Sector {
    pub fn new<I, S>(name: impl Into<String>, responsible: impl Into<String>, localities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            responsible: responsible.into(),
            localities: localities.into_iter().map(Into::into).collect(),
        }
    }

    pub fn contains(&self, locality: &str) -> bool {
        self.localities.iter().any(|member| member == locality)
    }
}

/// Ordered, immutable sector reference table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SectorTable {
    sectors: Vec<Sector>,
}

impl SectorTable {
    pub fn new(sectors: Vec<Sector>) -> Self {
        Self { sectors }
    }

    /// Built-in sectors of the reporting organization
    pub fn reference() -> Self {
        Self::new(vec![
            Sector::new(
                "Setor 9.1",
                "Setor 9.1",
                [
                    "JARDIM DAS LARANJEIRAS",
                    "CASA GRANDE",
                    "JARDIM DOS VELEIROS",
                    "JARDIM DOS ALAMOS",
                    "VILA ESPERANCA",
                    "VILA SAO JOSE",
                    "PARQUE FLORESTAL",
                    "JARDIM IPORANGA",
                    "FAZENDA DO SCHUNK",
                    "RECANTO DOS NOBRES",
                    "JARDIM LALO",
                    "JARDIM GUANHEMBU",
                    "INTERLAGOS",
                ],
            ),
            Sector::new(
                "Setor 9.2",
                "Setor 9.2",
                [
                    "CHACARA MARIETA",
                    "CHACARAS SANTO AMARO",
                    "ILHA DO BORORE",
                    "ITAIM",
                    "JARDIM ELIANE",
                    "JARDIM LUCELIA",
                    "JARDIM MARILDA",
                    "JARDIM SANTA BARBARA",
                    "JARDIM SAO BERNARDO",
                    "JARDIM SAO RAFAEL",
                    "JARDIM SETE DE SETEMBRO",
                    "JARDIM TRES CORACOES",
                    "PARQUE GRAJAU",
                    "PARQUE RESIDENCIAL COCAIA",
                ],
            ),
            Sector::new(
                "Setor 9.3",
                "Setor 9.3",
                [
                    "BARRAGEM",
                    "CIDADE NOVA AMERICA",
                    "COLONIA PAULISTA",
                    "EMBURA",
                    "ESTACAO EVANGELISTA DE SOUZA",
                    "JARDIM DAS FONTES",
                    "ENGENHEIRO MARSILAC",
                    "PARELHEIROS",
                    "PONTE SECA",
                    "RECANTO ANA MARIA",
                    "JARDIM SAO NORBERTO",
                    "VARGEM GRANDE",
                    "VILA ROSCHEL",
                ],
            ),
        ])
    }

    pub fn sectors(&self) -> &[Sector] {
        &self.sectors
    }

    /// First sector, in table order, that lists `locality`
    pub fn sector_of(&self, locality: &str) -> Option<&Sector> {
        self.sectors.iter().find(|sector| sector.contains(locality))
    }

    /// Resolve the output destination for `locality`
    ///
    /// First match wins when the table lists a locality more than once.
    pub fn resolve(&self, locality: &str) -> Destination {
        match self.sector_of(locality) {
            Some(sector) => Destination::Sector(sector.name.clone()),
            None => Destination::Unassigned,
        }
    }

    /// Localities listed by more than one sector, with the claiming sectors in order
    pub fn overlaps(&self) -> BTreeMap<String, Vec<String>> {
        let mut claims: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for sector in &self.sectors {
            for locality in &sector.localities {
                let owners = claims.entry(locality.clone()).or_default();
                if !owners.contains(&sector.name) {
                    owners.push(sector.name.clone());
                }
            }
        }
        claims.retain(|_, owners| owners.len() > 1);
        claims
    }
}
