//! Residue-name classification against the closed sets from the engine
//! reference manual, and assembly of the human-readable simulation
//! category ("Protein / DNA in Explicit Water", ...).

use std::collections::HashMap;

use serde::Serialize;

pub const WATER_RESNAMES: &[&str] = &[
    "WAT", "HOH", "SOL", // classic
    "TIP3", "TP3", "TIP3P", // TIP3P variants
    "TIP4", "T4P", "TIP4P", "T4E", // TIP4P variants
    "TIP5", "T5P", "TIP5P", // TIP5P
    "SPC", "SPCE", "SPC/E", // SPC variants
    "OPC", "OPC3", "OL3", // modern OPC models
    "POL3", "QSP", "F3C", // polarizable / flexible
];

pub const ORGANIC_SOLVENT_RESNAMES: &[&str] = &["MEOH", "CHCL3", "NMA", "UREA", "ETH", "MOL"];

pub const PROTEIN_RESNAMES: &[&str] = &[
    "ALA", "ARG", "ASN", "ASP", "CYS", "GLN", "GLU", "GLY", "HIS", "ILE", "LEU", "LYS", "MET",
    "PHE", "PRO", "SER", "THR", "TRP", "TYR", "VAL", // standard
    "HIE", "HID", "HIP", "CYX", "CYM", "ASH", "GLH", "LYN", "ARN", // protonation states
    "ACE", "NME", "NHE", "NH2", "CH3", // caps
    "CRO", "CR2", "CRF", "CRQ", "CH6", // fluorescent chromophores
];

pub const DNA_RESNAMES: &[&str] = &[
    "DA", "DC", "DG", "DT", "DA5", "DC5", "DG5", "DT5", "DA3", "DC3", "DG3", "DT3",
];

pub const RNA_RESNAMES: &[&str] = &[
    "A", "C", "G", "U", "A5", "C5", "G5", "U5", "A3", "C3", "G3", "U3", "RA", "RC", "RG", "RU",
];

pub const LIPID_RESNAMES: &[&str] = &[
    "LAL", "MY", "PA", "SA", "OL", "ST", "AR", "DHA", // tails
    "PC", "PE", "PS", "PGR", "PGS", "PH", "SPM", // head groups
    "CHL", "CHOL", "POPC", "POPE", "DOPC", "DPPC",
];

pub const ION_RESNAMES: &[&str] = &[
    "Li+", "Na+", "K+", "Rb+", "Cs+", "F-", "Cl-", "Br-", "I-", "Mg+", "Mg2+", "Ca2+", "Zn2+",
    "Ba2+", "Sr2+", "Fe2+", "Mn2+", "Co2+", "Ni2+", "Cu2+", "Cd2+", "Fe3+", "Cr3+", "Al3+",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ResidueClass {
    Protein,
    Dna,
    Rna,
    Lipid,
    Water,
    OrganicSolvent,
    Ion,
    Other,
}

/// Classify one residue label. Termini-capped protein residues come through
/// as 4-character names whose last three characters are the standard label
/// (NALA, CALA), so those fall back to a suffix check.
pub fn classify_residue(label: &str) -> ResidueClass {
    if PROTEIN_RESNAMES.contains(&label) {
        ResidueClass::Protein
    } else if DNA_RESNAMES.contains(&label) {
        ResidueClass::Dna
    } else if RNA_RESNAMES.contains(&label) {
        ResidueClass::Rna
    } else if LIPID_RESNAMES.contains(&label) {
        ResidueClass::Lipid
    } else if WATER_RESNAMES.contains(&label) {
        ResidueClass::Water
    } else if ORGANIC_SOLVENT_RESNAMES.contains(&label) {
        ResidueClass::OrganicSolvent
    } else if ION_RESNAMES.contains(&label) {
        ResidueClass::Ion
    } else if label.len() == 4 && PROTEIN_RESNAMES.contains(&&label[1..]) {
        ResidueClass::Protein
    } else {
        ResidueClass::Other
    }
}

/// Solvent environment of a topology, decided before classification from
/// box/radius-set presence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SolventKind {
    Vacuum,
    Implicit,
    Explicit,
}

///
/// Build the category string from the residue histogram and the solvent
/// kind: `"{solutes joined by ' / '} {solvent context}"`.
///
pub fn simulation_category(
    composition: &HashMap<String, usize>,
    solvent: SolventKind,
) -> String {
    let mut has = [false; 8];
    for label in composition.keys() {
        has[classify_residue(label) as usize] = true;
    }
    let [protein, dna, rna, lipid, water, organic, _ion, other] = has;

    let mut solutes: Vec<&str> = Vec::new();
    if protein {
        solutes.push("Protein");
    }
    if dna {
        solutes.push("DNA");
    }
    if rna {
        solutes.push("RNA");
    }
    if lipid {
        solutes.push("Lipid/Membrane");
    }

    // Unrecognized residues only matter when no major biomolecule was seen.
    if other && solutes.is_empty() {
        solutes.push("Small Molecule / Ligand");
    }

    let solute_str = if solutes.is_empty() {
        "Pure Solvent/Ions".to_string()
    } else {
        solutes.join(" / ")
    };

    let solvent_context = match solvent {
        SolventKind::Implicit => "in Implicit Solvent",
        SolventKind::Vacuum => "in Vacuum",
        SolventKind::Explicit => match (water, organic) {
            (true, true) => "in Mixed Solvent (Water+Organic)",
            (true, false) => "in Explicit Water",
            (false, true) => "in Organic Solvent",
            (false, false) => "in Explicit Solvent (Unknown)",
        },
    };

    format!("{} {}", solute_str, solvent_context)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn histogram(labels: &[&str]) -> HashMap<String, usize> {
        let mut out = HashMap::new();
        for l in labels {
            *out.entry(l.to_string()).or_insert(0) += 1;
        }
        out
    }

    #[rstest]
    #[case("ALA", ResidueClass::Protein)]
    #[case("NALA", ResidueClass::Protein)] // N-terminal cap variant
    #[case("CGLY", ResidueClass::Protein)]
    #[case("DA5", ResidueClass::Dna)]
    #[case("RU", ResidueClass::Rna)]
    #[case("POPC", ResidueClass::Lipid)]
    #[case("WAT", ResidueClass::Water)]
    #[case("MEOH", ResidueClass::OrganicSolvent)]
    #[case("Na+", ResidueClass::Ion)]
    #[case("LIG", ResidueClass::Other)]
    fn residue_classification(#[case] label: &str, #[case] expected: ResidueClass) {
        assert_eq!(classify_residue(label), expected);
    }

    #[test]
    fn protein_in_water() {
        let comp = histogram(&["ALA", "GLY", "WAT", "Na+", "Cl-"]);
        assert_eq!(
            simulation_category(&comp, SolventKind::Explicit),
            "Protein in Explicit Water"
        );
    }

    #[test]
    fn complex_in_mixed_solvent() {
        let comp = histogram(&["ALA", "DA", "WAT", "MEOH"]);
        assert_eq!(
            simulation_category(&comp, SolventKind::Explicit),
            "Protein / DNA in Mixed Solvent (Water+Organic)"
        );
    }

    #[test]
    fn lone_ligand_in_implicit_solvent() {
        let comp = histogram(&["LIG"]);
        assert_eq!(
            simulation_category(&comp, SolventKind::Implicit),
            "Small Molecule / Ligand in Implicit Solvent"
        );
    }

    #[test]
    fn water_and_ions_only() {
        let comp = histogram(&["WAT", "Na+"]);
        assert_eq!(
            simulation_category(&comp, SolventKind::Explicit),
            "Pure Solvent/Ions in Explicit Water"
        );
    }
}
