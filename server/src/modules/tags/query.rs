//! The tag-filtered content query builder.
//!
//! Translates a [`TagFilter`] into paginated scans over both content tables.
//! The relational backend resolves tag predicates with EXISTS semi-joins
//! against `content_tag`: match-any is a single existence probe over the tag
//! set, match-all is one probe per tag ordered rarest-first by the injected
//! [`TagPopularity`] snapshot, so every intersection step stays on the
//! `(tag_id, content_source, content_id)` index instead of a grouped full
//! scan. The legacy backend answers the same queries from the denormalized
//! mirror column and doubles as the correctness oracle in tests.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use entity::{auto_content, content, content_tag};
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::sea_query::{Expr, IntoColumnRef, Query, SelectStatement};
use sea_orm::{
    ColumnTrait, Condition, DatabaseConnection, EntityTrait, JsonValue, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect,
};
use tracing::debug;

use super::dual_write::decode_mirror;
use super::stats::TagPopularity;
use super::types::{
    ContentKey, ContentSource, CreatorScope, Cursor, MatchMode, Page, TagError, TagFilter,
};

/// Hard cap on requested page size.
const MAX_PAGE_SIZE: u64 = 200;

/// Rows fetched per round-trip by the legacy mirror scan.
const LEGACY_SCAN_CHUNK: u64 = 256;

/// Which physical representation answers the query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryBackend {
    /// The normalized `content_tag` relation (the production path).
    Relation,
    /// Array-containment scan over the legacy mirror column, for stores
    /// that lack the relation (lightweight test databases). Slower, but
    /// must produce identical result sets.
    LegacyArray,
}

pub struct FilterQuery {
    db: DatabaseConnection,
    backend: QueryBackend,
    stats: Arc<TagPopularity>,
}

impl FilterQuery {
    pub fn new(db: DatabaseConnection) -> Self {
        Self {
            db,
            backend: QueryBackend::Relation,
            stats: Arc::new(TagPopularity::empty()),
        }
    }

    pub fn with_backend(mut self, backend: QueryBackend) -> Self {
        self.backend = backend;
        self
    }

    /// Injects a popularity snapshot for match-all planning.
    pub fn with_stats(mut self, stats: Arc<TagPopularity>) -> Self {
        self.stats = stats;
        self
    }

    /// Executes the filter and returns one page of content identifiers.
    ///
    /// Filters that select nothing by construction (creator scope `None`,
    /// an explicitly empty source scope, match-any over an empty tag set,
    /// or a scope that needs a viewer without one) yield an empty page, not
    /// an error; store failures propagate so callers can tell "nothing
    /// matched" from "could not determine what matched".
    pub async fn execute(&self, filter: &TagFilter) -> Result<Page, TagError> {
        if !selects_anything(filter) {
            return Ok(Page::empty());
        }

        let page_size = filter.page_size.min(MAX_PAGE_SIZE);

        let tags = dedupe_preserving_order(&filter.tag_ids);
        let ordered = match filter.match_mode {
            MatchMode::All => self.stats.order_by_selectivity(&tags),
            MatchMode::Any => tags,
        };

        let sources = selected_sources(filter);

        debug!(
            mode = ?filter.match_mode,
            tag_count = ordered.len(),
            source_count = sources.len(),
            backend = ?self.backend,
            "Executing tag filter query"
        );

        // Fetch one row past the page to learn whether more pages exist.
        let want = page_size + 1;
        let mut items: Vec<(ContentKey, DateTimeWithTimeZone)> = Vec::new();

        for source in sources.iter().copied() {
            let after = match &filter.cursor {
                Some(cursor) => {
                    // Sources before the cursor's source were fully
                    // delivered on earlier pages.
                    if source.rank() < cursor.source.rank() {
                        continue;
                    }
                    if cursor.source == source {
                        Some(cursor)
                    } else {
                        None
                    }
                }
                None => None,
            };

            let remaining = want - items.len() as u64;
            if remaining == 0 {
                break;
            }

            let rows = self
                .page_source(filter, &ordered, source, after, remaining)
                .await?;
            items.extend(
                rows.into_iter()
                    .map(|(id, created_at)| (ContentKey::new(id, source), created_at)),
            );
        }

        let has_more = items.len() as u64 > page_size;
        items.truncate(page_size as usize);

        let next_cursor = if has_more {
            items.last().map(|(key, created_at)| Cursor {
                source: key.source,
                created_at: *created_at,
                content_id: key.id,
            })
        } else {
            None
        };

        let total = if filter.include_total {
            let mut sum = 0u64;
            for source in sources.iter().copied() {
                sum += self.count_source(filter, &ordered, source).await?;
            }
            Some(sum)
        } else {
            None
        };

        Ok(Page {
            items: items.into_iter().map(|(key, _)| key).collect(),
            next_cursor,
            total,
        })
    }

    /// Executes with a caller-imposed deadline. On expiry the query is
    /// abandoned and [`TagError::Timeout`] is returned; no partial page is
    /// ever delivered.
    pub async fn execute_with_timeout(
        &self,
        filter: &TagFilter,
        timeout: Duration,
    ) -> Result<Page, TagError> {
        run_with_deadline(self.execute(filter), timeout).await
    }

    async fn page_source(
        &self,
        filter: &TagFilter,
        ordered_tags: &[i32],
        source: ContentSource,
        after: Option<&Cursor>,
        limit: u64,
    ) -> Result<Vec<(i32, DateTimeWithTimeZone)>, TagError> {
        match (self.backend, source) {
            (QueryBackend::Relation, ContentSource::Regular) => {
                relation_page_regular(&self.db, filter, ordered_tags, after, limit).await
            }
            (QueryBackend::Relation, ContentSource::Auto) => {
                relation_page_auto(&self.db, filter, ordered_tags, after, limit).await
            }
            (QueryBackend::LegacyArray, ContentSource::Regular) => {
                legacy_page_regular(&self.db, filter, ordered_tags, after, limit).await
            }
            (QueryBackend::LegacyArray, ContentSource::Auto) => {
                legacy_page_auto(&self.db, filter, ordered_tags, after, limit).await
            }
        }
    }

    async fn count_source(
        &self,
        filter: &TagFilter,
        ordered_tags: &[i32],
        source: ContentSource,
    ) -> Result<u64, TagError> {
        match (self.backend, source) {
            (QueryBackend::Relation, ContentSource::Regular) => {
                relation_count_regular(&self.db, filter, ordered_tags).await
            }
            (QueryBackend::Relation, ContentSource::Auto) => {
                relation_count_auto(&self.db, filter, ordered_tags).await
            }
            (QueryBackend::LegacyArray, ContentSource::Regular) => {
                legacy_count_regular(&self.db, filter, ordered_tags).await
            }
            (QueryBackend::LegacyArray, ContentSource::Auto) => {
                legacy_count_auto(&self.db, filter, ordered_tags).await
            }
        }
    }
}

/// Races a query against its deadline. Expiry abandons the query and maps
/// to [`TagError::Timeout`]; a partial page is never delivered.
async fn run_with_deadline<F>(query: F, deadline: Duration) -> Result<Page, TagError>
where
    F: std::future::Future<Output = Result<Page, TagError>>,
{
    match tokio::time::timeout(deadline, query).await {
        Ok(result) => result,
        Err(_) => Err(TagError::Timeout),
    }
}

fn selects_anything(filter: &TagFilter) -> bool {
    if filter.page_size == 0 {
        return false;
    }
    match filter.creator_scope {
        CreatorScope::None => return false,
        CreatorScope::Own | CreatorScope::Others if filter.viewer_id.is_none() => return false,
        _ => {}
    }
    if let Some(sources) = &filter.sources {
        // Explicitly empty scope selects nothing; distinct from an absent
        // scope, which defaults to all sources.
        if sources.is_empty() {
            return false;
        }
    }
    // Match-any over no tags matches no edge. Match-all over no tags is
    // vacuously true and degrades to creator/source-scoped browsing.
    if filter.match_mode == MatchMode::Any && filter.tag_ids.is_empty() {
        return false;
    }
    true
}

fn selected_sources(filter: &TagFilter) -> Vec<ContentSource> {
    match &filter.sources {
        None => ContentSource::ALL.to_vec(),
        Some(selected) => ContentSource::ALL
            .iter()
            .copied()
            .filter(|source| selected.contains(source))
            .collect(),
    }
}

fn dedupe_preserving_order(tag_ids: &[i32]) -> Vec<i32> {
    let mut seen = HashSet::new();
    tag_ids
        .iter()
        .copied()
        .filter(|tag_id| seen.insert(*tag_id))
        .collect()
}

/// Existence probe against the relation, correlated on the outer content id.
fn edge_exists<O: IntoColumnRef>(
    source: ContentSource,
    tag_ids: &[i32],
    outer_id: O,
) -> SelectStatement {
    Query::select()
        .expr(Expr::val(1))
        .from(content_tag::Entity)
        .and_where(
            Expr::col((content_tag::Entity, content_tag::Column::ContentSource))
                .eq(source.as_str()),
        )
        .and_where(
            Expr::col((content_tag::Entity, content_tag::Column::TagId))
                .is_in(tag_ids.iter().copied()),
        )
        .and_where(Expr::col((content_tag::Entity, content_tag::Column::ContentId)).equals(outer_id))
        .to_owned()
}

/// Keyset predicate: rows strictly after `(created_at, id)` in tuple order.
fn tuple_after<C: ColumnTrait + Copy>(
    created_at_col: C,
    id_col: C,
    created_at: DateTimeWithTimeZone,
    id: i32,
) -> Condition {
    Condition::any()
        .add(created_at_col.gt(created_at))
        .add(
            Condition::all()
                .add(created_at_col.eq(created_at))
                .add(id_col.gt(id)),
        )
}

fn mirror_matches(row_tags: &[i32], requested: &[i32], mode: MatchMode) -> bool {
    match mode {
        MatchMode::Any => requested.iter().any(|tag| row_tags.contains(tag)),
        MatchMode::All => requested.iter().all(|tag| row_tags.contains(tag)),
    }
}

macro_rules! relation_source_queries {
    ($base_fn:ident, $page_fn:ident, $count_fn:ident, $table:ident, $source:expr) => {
        fn $base_fn(filter: &TagFilter, ordered_tags: &[i32]) -> sea_orm::Select<$table::Entity> {
            let mut query = $table::Entity::find();

            match (filter.creator_scope, filter.viewer_id) {
                (CreatorScope::Own, Some(viewer)) => {
                    query = query.filter($table::Column::CreatorId.eq(viewer));
                }
                (CreatorScope::Others, Some(viewer)) => {
                    query = query.filter($table::Column::CreatorId.ne(viewer));
                }
                // Both applies no creator predicate at all; None and scopes
                // missing a viewer never reach query construction.
                _ => {}
            }

            match filter.match_mode {
                MatchMode::Any => {
                    if !ordered_tags.is_empty() {
                        let sub = edge_exists(
                            $source,
                            ordered_tags,
                            ($table::Entity, $table::Column::Id),
                        );
                        query = query.filter(Expr::exists(sub));
                    }
                }
                MatchMode::All => {
                    // One probe per tag, rarest first, so each intersection
                    // step narrows against the smallest candidate set.
                    for tag_id in ordered_tags {
                        let sub = edge_exists(
                            $source,
                            std::slice::from_ref(tag_id),
                            ($table::Entity, $table::Column::Id),
                        );
                        query = query.filter(Expr::exists(sub));
                    }
                }
            }

            query
        }

        async fn $page_fn(
            db: &DatabaseConnection,
            filter: &TagFilter,
            ordered_tags: &[i32],
            after: Option<&Cursor>,
            limit: u64,
        ) -> Result<Vec<(i32, DateTimeWithTimeZone)>, TagError> {
            let mut query = $base_fn(filter, ordered_tags)
                .select_only()
                .column($table::Column::Id)
                .column($table::Column::CreatedAt)
                .order_by_asc($table::Column::CreatedAt)
                .order_by_asc($table::Column::Id)
                .limit(limit);

            if let Some(cursor) = after {
                query = query.filter(tuple_after(
                    $table::Column::CreatedAt,
                    $table::Column::Id,
                    cursor.created_at,
                    cursor.content_id,
                ));
            }

            Ok(query.into_tuple().all(db).await?)
        }

        async fn $count_fn(
            db: &DatabaseConnection,
            filter: &TagFilter,
            ordered_tags: &[i32],
        ) -> Result<u64, TagError> {
            Ok($base_fn(filter, ordered_tags).count(db).await?)
        }
    };
}

relation_source_queries!(
    relation_base_regular,
    relation_page_regular,
    relation_count_regular,
    content,
    ContentSource::Regular
);
relation_source_queries!(
    relation_base_auto,
    relation_page_auto,
    relation_count_auto,
    auto_content,
    ContentSource::Auto
);

macro_rules! legacy_source_queries {
    ($page_fn:ident, $count_fn:ident, $table:ident) => {
        async fn $page_fn(
            db: &DatabaseConnection,
            filter: &TagFilter,
            tag_ids: &[i32],
            after: Option<&Cursor>,
            limit: u64,
        ) -> Result<Vec<(i32, DateTimeWithTimeZone)>, TagError> {
            let mut out: Vec<(i32, DateTimeWithTimeZone)> = Vec::new();
            let mut position: Option<(DateTimeWithTimeZone, i32)> =
                after.map(|cursor| (cursor.created_at, cursor.content_id));

            loop {
                let mut query = $table::Entity::find()
                    .select_only()
                    .column($table::Column::Id)
                    .column($table::Column::CreatedAt)
                    .column($table::Column::TagIds)
                    .order_by_asc($table::Column::CreatedAt)
                    .order_by_asc($table::Column::Id)
                    .limit(LEGACY_SCAN_CHUNK);

                match (filter.creator_scope, filter.viewer_id) {
                    (CreatorScope::Own, Some(viewer)) => {
                        query = query.filter($table::Column::CreatorId.eq(viewer));
                    }
                    (CreatorScope::Others, Some(viewer)) => {
                        query = query.filter($table::Column::CreatorId.ne(viewer));
                    }
                    _ => {}
                }

                if let Some((created_at, id)) = position {
                    query = query.filter(tuple_after(
                        $table::Column::CreatedAt,
                        $table::Column::Id,
                        created_at,
                        id,
                    ));
                }

                let rows: Vec<(i32, DateTimeWithTimeZone, Option<JsonValue>)> =
                    query.into_tuple().all(db).await?;
                let fetched = rows.len() as u64;

                for (id, created_at, mirror) in rows {
                    position = Some((created_at, id));
                    let row_tags = decode_mirror(mirror.as_ref());
                    if mirror_matches(&row_tags, tag_ids, filter.match_mode) {
                        out.push((id, created_at));
                        if out.len() as u64 == limit {
                            return Ok(out);
                        }
                    }
                }

                if fetched < LEGACY_SCAN_CHUNK {
                    return Ok(out);
                }
            }
        }

        async fn $count_fn(
            db: &DatabaseConnection,
            filter: &TagFilter,
            tag_ids: &[i32],
        ) -> Result<u64, TagError> {
            // Full mirror scan; this backend only serves small test stores.
            let matched = $page_fn(db, filter, tag_ids, None, u64::MAX).await?;
            Ok(matched.len() as u64)
        }
    };
}

legacy_source_queries!(legacy_page_regular, legacy_count_regular, content);
legacy_source_queries!(legacy_page_auto, legacy_count_auto, auto_content);
