#[macro_export]
macro_rules! record_wo_desc {
    ($e1:expr,$e2:expr) => {{
        use bio::io::fasta::Record;
        Record::with_attrs($e1, None, $e2)
    }};
}

#[macro_export]
macro_rules! record {
    ($e1:expr,$e2:expr,$e3:expr) => {{
        use bio::io::fasta::Record;
        Record::with_attrs($e1, $e2, $e3)
    }};
}

#[macro_export]
macro_rules! tree {
    ($e:expr) => {{
        use $crate::tree::tree_parser::from_newick;
        from_newick($e).unwrap().pop().unwrap()
    }};
}

/// Compact DNA states of a nucleotide string, anything outside ACGT mapped to the
/// ambiguous state 4.
#[macro_export]
macro_rules! dna_states {
    ($e:expr) => {{
        use $crate::alignment::dna_state;
        $e.iter().map(|&byte| dna_state(byte)).collect::<Vec<usize>>()
    }};
}
