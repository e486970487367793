use common::{
    error::AppError,
    storage::types::{text_unit::TextUnit, GraphRecord},
    utils::config::SearchSettings,
};

use super::{text_unit_record, BuiltContext, ContextWriter};
use crate::{
    engine::BasicQuery,
    scoring::{fuse_all, sort_by_fused_desc, FusionWeights, QueryTerms, Scored},
};

/// The `basic_k` text units closest to the query. Falls back to the first
/// units of each table when nothing matches.
pub fn build_basic_context(
    query: &BasicQuery,
    settings: &SearchSettings,
) -> Result<BuiltContext, AppError> {
    let terms = QueryTerms::parse(&query.query);
    let mut writer = ContextWriter::new(query.text_units.len());

    for indexed in &query.text_units {
        writer.begin_index(&indexed.name);
        let units = TextUnit::from_table(&indexed.table)?;

        let mut scored: Vec<Scored<TextUnit>> = units
            .into_iter()
            .map(|unit| {
                let lexical = terms.overlap(&unit.text);
                Scored::new(unit).with_lexical_score(lexical)
            })
            .collect();

        let selected: Vec<Scored<TextUnit>> = if scored.iter().any(Scored::matched) {
            fuse_all(&mut scored, FusionWeights::default());
            sort_by_fused_desc(&mut scored);
            scored
                .into_iter()
                .filter(Scored::matched)
                .take(settings.basic_k)
                .collect()
        } else {
            scored.into_iter().take(settings.basic_k).collect()
        };

        writer.section(
            "sources",
            "Sources",
            &["id", "text"],
            selected
                .iter()
                .map(|scored| text_unit_record(&indexed.name, &scored.item))
                .collect(),
        );
    }

    Ok(writer.finish(settings.max_context_tokens))
}
