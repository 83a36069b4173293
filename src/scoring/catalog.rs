use serde::Serialize;

/// Points for a verified certification missing from the table.
pub const DEFAULT_CERTIFICATION_POINTS: u32 = 5;

const CERTIFICATIONS: &[(&str, u32)] = &[
    ("OSCP", 30),
    ("eJPT", 15),
    ("CEH", 22),
    ("CompTIA Security+", 18),
    ("PMP", 25),
    ("CAPM", 12),
    ("AWS Solutions Architect", 20),
    ("AWS Cloud Practitioner", 10),
    ("Azure AI Engineer", 18),
    ("Google Data Analytics", 14),
    ("Google Cloud Associate", 16),
    ("TensorFlow Developer", 16),
    ("Deep Learning Specialization", 15),
    ("Scrum Master", 12),
    ("CISSP", 30),
    ("CISA", 25),
    ("React Developer", 10),
    ("Node.js Certified", 10),
    ("SolidWorks CSWA", 12),
    ("PMP Fundamentals", 8),
    ("Google Ads Certification", 10),
    ("HubSpot Inbound Marketing", 8),
    ("IBM AI Engineering", 14),
    ("Python for Data Science", 10),
    ("CFA Level 1", 20),
    ("CCNA", 18),
    ("CCNP", 25),
];

const ACTIVITIES: &[(&str, u32)] = &[
    ("Mentoring freshmen", 5),
    ("Public speaking event", 8),
    ("Hackathon participant", 10),
    ("Hackathon winner", 15),
    ("Research publication", 20),
    ("Community volunteer", 5),
    ("Student club leader", 8),
    ("Competition winner", 12),
    ("Open source contribution", 10),
    ("Teaching assistant", 7),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogEntry {
    pub name: String,
    pub points: u32,
}

/// Read-only certification and activity point tables.
#[derive(Debug, Clone)]
pub struct Catalog {
    certifications: Vec<CatalogEntry>,
    activities: Vec<CatalogEntry>,
}

fn entries(table: &[(&str, u32)]) -> Vec<CatalogEntry> {
    table
        .iter()
        .map(|(name, points)| CatalogEntry { name: (*name).to_string(), points: *points })
        .collect()
}

fn lookup(table: &[CatalogEntry], name: &str) -> Option<u32> {
    let name = name.trim();
    table
        .iter()
        .find(|e| e.name.eq_ignore_ascii_case(name))
        .map(|e| e.points)
}

impl Default for Catalog {
    fn default() -> Self {
        Self {
            certifications: entries(CERTIFICATIONS),
            activities: entries(ACTIVITIES),
        }
    }
}

impl Catalog {
    pub fn certification_points(&self, name: &str) -> u32 {
        lookup(&self.certifications, name).unwrap_or(DEFAULT_CERTIFICATION_POINTS)
    }

    pub fn activity_points(&self, name: &str) -> Option<u32> {
        lookup(&self.activities, name)
    }

    pub fn certifications(&self) -> &[CatalogEntry] {
        &self.certifications
    }

    pub fn activities(&self) -> &[CatalogEntry] {
        &self.activities
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_certification_gets_default_points() {
        let catalog = Catalog::default();
        assert_eq!(catalog.certification_points("OSCP"), 30);
        assert_eq!(catalog.certification_points("ccna"), 18);
        assert_eq!(catalog.certification_points("Made-up Cert"), DEFAULT_CERTIFICATION_POINTS);
    }

    #[test]
    fn activity_lookup() {
        let catalog = Catalog::default();
        assert_eq!(catalog.activity_points("Hackathon winner"), Some(15));
        assert_eq!(catalog.activity_points("Chess club"), None);
        assert_eq!(catalog.activities().len(), 10);
    }
}
