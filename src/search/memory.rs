//! In-process search index on tantivy.
//!
//! Mirrors the Elasticsearch `multi_match` query locally so standalone mode
//! and tests get the same fuzzy behavior without a cluster. Documents live in
//! a RAM index; each upsert is committed before it returns.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use tantivy::collector::TopDocs;
use tantivy::query::{AllQuery, BooleanQuery, BoostQuery, FuzzyTermQuery, Occur, Query, TermQuery};
use tantivy::schema::{Field, IndexRecordOption, Schema, Value, STORED, STRING, TEXT};
use tantivy::tokenizer::TokenStream;
use tantivy::{doc, DocAddress, Index, IndexReader, IndexWriter, Searcher, TantivyDocument, Term};
use tracing::debug;

use super::{Result, SearchError, SearchIndex, SearchQuery};
use crate::models::Feed;

const TITLE_BOOST: f32 = 2.0;
const DESCRIPTION_BOOST: f32 = 1.0;

/// Edits are capped at two, matching Elasticsearch's fuzzy query limit.
const MAX_EDITS: u32 = 2;

/// Single writer thread at tantivy's minimum arena size.
const WRITER_HEAP_BYTES: usize = 15_000_000;

/// Edits allowed for `term` under the `AUTO` rule (none up to 2 chars, one
/// up to 5, two beyond), bounded by the requested fuzziness.
fn allowed_edits(term: &str, fuzziness: u32) -> u8 {
    let auto = match term.chars().count() {
        0..=2 => 0,
        3..=5 => 1,
        _ => 2,
    };
    fuzziness.min(MAX_EDITS).min(auto) as u8
}

struct FeedFields {
    id: Field,
    title: Field,
    description: Field,
    /// The full feed as JSON, like Elasticsearch's `_source`.
    source: Field,
}

impl FeedFields {
    fn schema() -> (Schema, Self) {
        let mut builder = Schema::builder();
        let fields = Self {
            id: builder.add_text_field("id", STRING | STORED),
            title: builder.add_text_field("title", TEXT),
            description: builder.add_text_field("description", TEXT),
            source: builder.add_text_field("source", STORED),
        };
        (builder.build(), fields)
    }

    /// Searchable fields named by a query, with their boosts.
    fn searchable(&self, names: &[String]) -> Vec<(Field, f32)> {
        names
            .iter()
            .filter_map(|name| match name.as_str() {
                "title" => Some((self.title, TITLE_BOOST)),
                "description" => Some((self.description, DESCRIPTION_BOOST)),
                _ => None,
            })
            .collect()
    }
}

/// Feed documents in a tantivy RAM index keyed by id.
pub struct InMemorySearchIndex {
    index: Index,
    reader: IndexReader,
    writer: Mutex<IndexWriter>,
    fields: FeedFields,
}

impl InMemorySearchIndex {
    pub fn new() -> Result<Self> {
        let (schema, fields) = FeedFields::schema();
        let index = Index::create_in_ram(schema);
        let writer = index.writer_with_num_threads(1, WRITER_HEAP_BYTES)?;
        let reader = index.reader()?;
        Ok(Self {
            index,
            reader,
            writer: Mutex::new(writer),
            fields,
        })
    }

    pub async fn len(&self) -> usize {
        self.reader.searcher().num_docs() as usize
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Query text split the way `title` is indexed, deduplicated.
    fn analyze(&self, text: &str) -> Result<Vec<String>> {
        let mut analyzer = self.index.tokenizer_for_field(self.fields.title)?;
        let mut stream = analyzer.token_stream(text);
        let mut seen = HashSet::new();
        let mut terms = Vec::new();
        stream.process(&mut |token| {
            if seen.insert(token.text.clone()) {
                terms.push(token.text.clone());
            }
        });
        Ok(terms)
    }

    /// Clause matching one query term in any field: exact matches score by
    /// BM25, fuzzy matches add a constant.
    fn term_clause(&self, term: &str, fields: &[(Field, f32)], edits: u8) -> Box<dyn Query> {
        let mut clauses: Vec<(Occur, Box<dyn Query>)> = Vec::new();
        for &(field, boost) in fields {
            let exact = TermQuery::new(
                Term::from_field_text(field, term),
                IndexRecordOption::WithFreqs,
            );
            let exact: Box<dyn Query> = Box::new(BoostQuery::new(Box::new(exact), boost));
            clauses.push((Occur::Should, exact));
            if edits > 0 {
                let fuzzy = FuzzyTermQuery::new(Term::from_field_text(field, term), edits, true);
                let fuzzy: Box<dyn Query> = Box::new(BoostQuery::new(Box::new(fuzzy), boost));
                clauses.push((Occur::Should, fuzzy));
            }
        }
        Box::new(BooleanQuery::new(clauses))
    }

    /// Whether `term` occurs exactly in more than `cutoff` of the documents.
    fn is_common(
        &self,
        searcher: &Searcher,
        term: &str,
        fields: &[(Field, f32)],
        cutoff: f64,
    ) -> Result<bool> {
        let total = searcher.num_docs() as f64;
        let mut frequency = 0u64;
        for &(field, _) in fields {
            frequency = frequency.max(searcher.doc_freq(&Term::from_field_text(field, term))?);
        }
        Ok(frequency as f64 / total > cutoff)
    }

    fn load(&self, searcher: &Searcher, address: DocAddress) -> Result<Feed> {
        let document: TantivyDocument = searcher.doc(address)?;
        let source = document
            .get_first(self.fields.source)
            .and_then(|v| v.as_str())
            .ok_or_else(|| SearchError::Decoding("document without source".to_string()))?;
        serde_json::from_str(source).map_err(|e| SearchError::Decoding(e.to_string()))
    }

    fn lock_writer(&self) -> Result<std::sync::MutexGuard<'_, IndexWriter>> {
        self.writer
            .lock()
            .map_err(|_| SearchError::Engine("index writer lock poisoned".to_string()))
    }
}

fn newest_first(a: &Feed, b: &Feed) -> Ordering {
    b.created_at
        .cmp(&a.created_at)
        .then_with(|| a.id.cmp(&b.id))
}

#[async_trait]
impl SearchIndex for InMemorySearchIndex {
    fn name(&self) -> &str {
        "memory"
    }

    async fn upsert(&self, feed: &Feed) -> Result<()> {
        let source =
            serde_json::to_string(feed).map_err(|e| SearchError::Decoding(e.to_string()))?;
        {
            let mut writer = self.lock_writer()?;
            writer.delete_term(Term::from_field_text(self.fields.id, &feed.id));
            writer.add_document(doc!(
                self.fields.id => feed.id.clone(),
                self.fields.title => feed.title.clone(),
                self.fields.description => feed.description.clone(),
                self.fields.source => source,
            ))?;
            writer.commit()?;
        }
        self.reader.reload()?;
        debug!(id = %feed.id, "Indexed feed document");
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Feed>> {
        let searcher = self.reader.searcher();
        let total = searcher.num_docs() as usize;
        if total == 0 {
            return Ok(Vec::new());
        }
        let mut feeds = searcher
            .search(&AllQuery, &TopDocs::with_limit(total))?
            .into_iter()
            .map(|(_, address)| self.load(&searcher, address))
            .collect::<Result<Vec<_>>>()?;
        feeds.sort_by(newest_first);
        Ok(feeds)
    }

    /// A document matches when it matches at least one rare term, or every
    /// term when all of them are common. Common terms still add to the score.
    async fn search(&self, query: &SearchQuery) -> Result<Vec<Feed>> {
        let terms = self.analyze(&query.text)?;
        let fields = self.fields.searchable(&query.fields);
        let searcher = self.reader.searcher();
        let total = searcher.num_docs() as usize;
        if terms.is_empty() || fields.is_empty() || total == 0 {
            return Ok(Vec::new());
        }

        let mut rare = Vec::new();
        let mut common = Vec::new();
        for term in &terms {
            let clause = self.term_clause(term, &fields, allowed_edits(term, query.fuzziness));
            if self.is_common(&searcher, term, &fields, query.cutoff_frequency)? {
                common.push(clause);
            } else {
                rare.push(clause);
            }
        }

        let combined: Box<dyn Query> = if rare.is_empty() {
            Box::new(BooleanQuery::new(
                common.into_iter().map(|c| (Occur::Must, c)).collect(),
            ))
        } else {
            let any_rare: Box<dyn Query> = Box::new(BooleanQuery::new(
                rare.into_iter().map(|c| (Occur::Should, c)).collect(),
            ));
            let mut clauses: Vec<(Occur, Box<dyn Query>)> = vec![(Occur::Must, any_rare)];
            clauses.extend(common.into_iter().map(|c| (Occur::Should, c)));
            Box::new(BooleanQuery::new(clauses))
        };

        let mut hits = searcher
            .search(&combined, &TopDocs::with_limit(total))?
            .into_iter()
            .map(|(score, address)| Ok((score, self.load(&searcher, address)?)))
            .collect::<Result<Vec<(f32, Feed)>>>()?;
        hits.sort_by(|(sa, a), (sb, b)| {
            sb.partial_cmp(sa)
                .unwrap_or(Ordering::Equal)
                .then_with(|| newest_first(a, b))
        });

        debug!(query = %query.text, hits = hits.len(), "In-memory search");
        Ok(hits.into_iter().map(|(_, feed)| feed).collect())
    }
}
