//! Fetch-and-parse over a set of sources.
//!
//! Every source is handled in isolation: its failure is recorded in its
//! [`SourceReport`] and never stops the others. Sources run concurrently
//! (bounded by [`RunContext::concurrency`]); the pages of one paginated
//! source are fetched one after another.
//!
//! # Per-source flow
//!
//! 1. Wait the politeness delay (plus jitter)
//! 2. Fetch the first page, static or rendered per the descriptor
//! 3. Parse it with the parser for the descriptor's family
//! 4. If the descriptor declares pagination, fetch further pages up to the
//!    smaller of the page's own count and the descriptor's cap
//!
//! The whole flow for one source is bounded by
//! [`RunContext::source_timeout`].

use crate::error::{FetchError, ParseError};
use crate::models::{FetchStrategy, Meeting, Pagination, SourceDescriptor};
use crate::scrapers::{Page, ParseOutcome, parser_for};
use crate::transport::{Transport, WaitCondition};
use chrono::NaiveDate;
use futures::stream::{self, StreamExt};
use rand::{Rng, rng};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use url::Url;

pub const DEFAULT_CONCURRENCY: usize = 4;
pub const DEFAULT_SOURCE_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_POLITENESS_DELAY: Duration = Duration::from_millis(500);

/// Run-wide settings passed explicitly to every stage.
#[derive(Debug, Clone)]
pub struct RunContext {
    /// Reference date for windows and year inference.
    pub today: NaiveDate,
    /// Pause before every request.
    pub politeness_delay: Duration,
    /// Upper bound for everything one source does.
    pub source_timeout: Duration,
    /// Sources processed at the same time.
    pub concurrency: usize,
}

impl RunContext {
    pub fn new(today: NaiveDate) -> Self {
        Self {
            today,
            politeness_delay: DEFAULT_POLITENESS_DELAY,
            source_timeout: DEFAULT_SOURCE_TIMEOUT,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

/// Outcome of one source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceStatus {
    /// At least one meeting was extracted.
    Success,
    /// The first page could not be retrieved.
    FetchFailed(FetchError),
    /// The first page was retrieved but its structure was not recognized.
    ParseFailed(ParseError),
    /// Retrieved and parsed, but no meetings listed.
    Empty,
}

impl SourceStatus {
    pub fn is_failure(&self) -> bool {
        matches!(self, SourceStatus::FetchFailed(_) | SourceStatus::ParseFailed(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            SourceStatus::Success => "success",
            SourceStatus::FetchFailed(_) => "fetch_failed",
            SourceStatus::ParseFailed(_) => "parse_failed",
            SourceStatus::Empty => "empty",
        }
    }
}

impl fmt::Display for SourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceStatus::FetchFailed(e) => write!(f, "{}: {e}", self.label()),
            SourceStatus::ParseFailed(e) => write!(f, "{}: {e}", self.label()),
            _ => f.write_str(self.label()),
        }
    }
}

/// What one source yielded.
#[derive(Debug, Clone)]
pub struct SourceReport {
    pub source_id: String,
    pub name: String,
    pub status: SourceStatus,
    pub meetings: Vec<Meeting>,
    /// Rows dropped as malformed.
    pub skipped: usize,
    /// Pages successfully fetched and parsed.
    pub pages: u32,
}

impl SourceReport {
    fn with_status(source: &SourceDescriptor, status: SourceStatus) -> Self {
        Self {
            source_id: source.id.clone(),
            name: source.name.clone(),
            status,
            meetings: Vec::new(),
            skipped: 0,
            pages: 0,
        }
    }
}

/// Per-source results of one extraction, keyed by source id.
#[derive(Debug, Clone, Default)]
pub struct ExtractionReport {
    pub sources: BTreeMap<String, SourceReport>,
}

impl ExtractionReport {
    /// All extracted meetings, in source-id order.
    pub fn meetings(&self) -> impl Iterator<Item = &Meeting> {
        self.sources.values().flat_map(|r| r.meetings.iter())
    }

    pub fn failed(&self) -> usize {
        self.sources.values().filter(|r| r.status.is_failure()).count()
    }

    /// True when there was at least one source and every one failed.
    pub fn all_failed(&self) -> bool {
        !self.sources.is_empty() && self.failed() == self.sources.len()
    }
}

/// Fetch and parse every source, absorbing per-source failures.
///
/// # Arguments
///
/// * `sources` - The sources selected for one pipeline.
/// * `transport` - Fetcher shared by every source.
/// * `ctx` - Run date, politeness delay, per-source timeout and concurrency.
///
/// # Returns
///
/// One [`SourceReport`] per source, keyed by source id. A failing or slow
/// source yields a failed report; it never aborts the others.
///
/// # Example
///
/// ```ignore
/// let report = extract(&sources, &transport, &RunContext::new(today)).await;
/// if report.all_failed() {
///     warn!("every source failed");
/// }
/// ```
#[instrument(level = "info", skip_all, fields(sources = sources.len()))]
pub async fn extract<T: Transport>(
    sources: &[&SourceDescriptor],
    transport: &T,
    ctx: &RunContext,
) -> ExtractionReport {
    let reports: Vec<SourceReport> = stream::iter(sources.iter().copied())
        .map(|source| extract_source(source, transport, ctx))
        .buffer_unordered(ctx.concurrency.max(1))
        .collect()
        .await;

    let report = ExtractionReport {
        sources: reports
            .into_iter()
            .map(|r| (r.source_id.clone(), r))
            .collect(),
    };
    info!(
        sources = report.sources.len(),
        failed = report.failed(),
        meetings = report.meetings().count(),
        "Extraction finished"
    );
    report
}

#[instrument(level = "info", skip_all, fields(source = %source.id, family = %source.family))]
async fn extract_source<T: Transport>(
    source: &SourceDescriptor,
    transport: &T,
    ctx: &RunContext,
) -> SourceReport {
    let report = match tokio::time::timeout(ctx.source_timeout, collect_source(source, transport, ctx)).await {
        Ok(report) => report,
        Err(_) => SourceReport::with_status(
            source,
            SourceStatus::FetchFailed(FetchError::Timeout {
                secs: ctx.source_timeout.as_secs(),
            }),
        ),
    };
    match &report.status {
        SourceStatus::FetchFailed(e) => warn!(error = %e, "Source could not be fetched"),
        SourceStatus::ParseFailed(e) => warn!(error = %e, "Source page not recognized"),
        SourceStatus::Empty => info!(skipped = report.skipped, "Source lists no meetings"),
        SourceStatus::Success => info!(
            meetings = report.meetings.len(),
            skipped = report.skipped,
            pages = report.pages,
            "Source extracted"
        ),
    }
    report
}

async fn collect_source<T: Transport>(
    source: &SourceDescriptor,
    transport: &T,
    ctx: &RunContext,
) -> SourceReport {
    let parser = parser_for(source.family);

    let body = match fetch_page(source, &source.url, transport, ctx).await {
        Ok(body) => body,
        Err(e) => return SourceReport::with_status(source, SourceStatus::FetchFailed(e)),
    };
    let page = Page {
        source,
        url: &source.url,
        body: &body,
        today: ctx.today,
    };
    if !parser.accepts(&page) {
        debug!(family = ?parser.family(), "Markup does not look like this family's; parsing anyway");
    }
    let first = match parser.parse(&page) {
        Ok(outcome) => outcome,
        Err(e) => return SourceReport::with_status(source, SourceStatus::ParseFailed(e)),
    };
    let declared = parser.declared_pages(&page);

    let mut report = SourceReport::with_status(source, SourceStatus::Success);
    absorb(&mut report, first);

    if let Some(pagination) = &source.pagination {
        let total = declared.unwrap_or(1).min(pagination.max_pages);
        debug!(declared = ?declared, cap = pagination.max_pages, total, "Paginated source");
        for offset in 1..total {
            let number = pagination.first_page + offset;
            let url = match page_url(&source.url, pagination, number) {
                Ok(url) => url,
                Err(e) => {
                    warn!(error = %e, "Cannot build page URL; keeping pages fetched so far");
                    break;
                }
            };
            let body = match fetch_page(source, &url, transport, ctx).await {
                Ok(body) => body,
                Err(e) => {
                    warn!(page = number, error = %e, "Page fetch failed; keeping pages fetched so far");
                    break;
                }
            };
            let page = Page {
                source,
                url: &url,
                body: &body,
                today: ctx.today,
            };
            match parser.parse(&page) {
                Ok(outcome) if outcome.is_empty() => {
                    debug!(page = number, "Page lists nothing; stopping pagination");
                    break;
                }
                Ok(outcome) => absorb(&mut report, outcome),
                Err(e) => {
                    warn!(page = number, error = %e, "Page not recognized; keeping pages fetched so far");
                    break;
                }
            }
        }
    }

    if report.meetings.is_empty() {
        report.status = SourceStatus::Empty;
    }
    report
}

fn absorb(report: &mut SourceReport, outcome: ParseOutcome) {
    report.meetings.extend(outcome.meetings);
    report.skipped += outcome.skipped;
    report.pages += 1;
}

async fn fetch_page<T: Transport>(
    source: &SourceDescriptor,
    url: &str,
    transport: &T,
    ctx: &RunContext,
) -> Result<String, FetchError> {
    politeness_pause(ctx.politeness_delay).await;
    debug!(%url, strategy = ?source.fetch, "Fetching page");
    let resp = match source.fetch {
        FetchStrategy::Static => transport.fetch_static(url).await?,
        FetchStrategy::Rendered => {
            let wait = WaitCondition::from_selector(source.wait_for.as_deref());
            transport.fetch_rendered(url, &wait).await?
        }
    };
    if !resp.is_success() {
        return Err(FetchError::Status {
            url: url.to_string(),
            status: resp.status,
        });
    }
    if resp.body.trim().is_empty() {
        return Err(FetchError::EmptyBody {
            url: url.to_string(),
        });
    }
    Ok(resp.body)
}

/// Sleep `delay` plus up to half of it again, so parallel sources do not
/// hit their servers in lockstep.
async fn politeness_pause(delay: Duration) {
    if delay.is_zero() {
        return;
    }
    let half = u64::try_from(delay.as_millis() / 2).unwrap_or(u64::MAX);
    let jitter = Duration::from_millis(rng().random_range(0..=half));
    tokio::time::sleep(delay + jitter).await;
}

/// URL of listing page `number`, replacing any existing page parameter.
pub fn page_url(base: &str, pagination: &Pagination, number: u32) -> Result<String, url::ParseError> {
    let mut url = Url::parse(base)?;
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| **k != *pagination.param)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    url.query_pairs_mut()
        .clear()
        .extend_pairs(kept)
        .append_pair(&pagination.param, &number.to_string());
    Ok(url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CmsFamily;
    use crate::transport::testing::{Reply, StubTransport};

    fn ctx() -> RunContext {
        RunContext {
            today: NaiveDate::from_ymd_opt(2025, 10, 1).unwrap(),
            politeness_delay: Duration::ZERO,
            source_timeout: Duration::from_secs(5),
            concurrency: 4,
        }
    }

    fn source(id: &str, family: CmsFamily, url: &str) -> SourceDescriptor {
        SourceDescriptor {
            id: id.to_string(),
            name: format!("{id} kommune"),
            family,
            fetch: FetchStrategy::Static,
            groups: vec!["core".to_string()],
            url: url.to_string(),
            wait_for: None,
            pagination: None,
        }
    }

    fn listing(total_pages: u32, rows: &[(&str, &str)]) -> String {
        let items: String = rows
            .iter()
            .map(|(title, date)| {
                format!(
                    r#"<li class="meeting-list__item"><h3 class="meeting-list__title">{title}</h3><span class="meeting-list__date">{date}</span></li>"#
                )
            })
            .collect();
        format!(r#"<ul class="meeting-list" data-total-pages="{total_pages}">{items}</ul>"#)
    }

    const OPENGOV_PAGE: &str = r#"<a href="/Meetings/Details/1"><div class="meetingName">Formannskapet</div>
        <div class="meetingDate"><span>13.10.2025</span><span>16:00</span></div></a>"#;

    #[test]
    fn test_page_url() {
        let p = Pagination {
            param: "side".to_string(),
            first_page: 1,
            max_pages: 5,
        };
        assert_eq!(
            page_url("https://bymiljopakken.no/moter/", &p, 2).unwrap(),
            "https://bymiljopakken.no/moter/?side=2"
        );
        assert_eq!(
            page_url("https://x.example/m?type=mote&side=1", &p, 3).unwrap(),
            "https://x.example/m?type=mote&side=3"
        );
    }

    #[tokio::test]
    async fn test_failures_are_isolated() {
        let ok = source("klepp", CmsFamily::Opengov, "https://ok.example/");
        let missing = source("borte", CmsFamily::Opengov, "https://missing.example/");
        let broken = source("rfk", CmsFamily::Elements, "https://broken.example/");
        let stub = StubTransport::new()
            .page("https://ok.example/", OPENGOV_PAGE)
            .page("https://broken.example/", r#"<div class="loading-indicator"></div>"#);

        let report = extract(&[&ok, &missing, &broken], &stub, &ctx()).await;
        assert_eq!(report.sources["klepp"].status, SourceStatus::Success);
        assert_eq!(report.sources["klepp"].meetings.len(), 1);
        assert!(matches!(
            report.sources["borte"].status,
            SourceStatus::FetchFailed(FetchError::Status { status: 404, .. })
        ));
        assert_eq!(
            report.sources["rfk"].status,
            SourceStatus::ParseFailed(ParseError::NotRendered)
        );
        assert_eq!(report.failed(), 2);
        assert!(!report.all_failed());
    }

    #[tokio::test]
    async fn test_empty_body_is_fetch_failure() {
        let s = source("tom", CmsFamily::Acos, "https://tom.example/");
        let stub = StubTransport::new().page("https://tom.example/", "  \n");
        let report = extract(&[&s], &stub, &ctx()).await;
        assert!(matches!(
            report.sources["tom"].status,
            SourceStatus::FetchFailed(FetchError::EmptyBody { .. })
        ));
        assert!(report.all_failed());
    }

    #[tokio::test]
    async fn test_page_without_meetings_is_empty() {
        let s = source("klepp", CmsFamily::Opengov, "https://ok.example/");
        let stub = StubTransport::new().page("https://ok.example/", "<p>Ingen møter</p>");
        let report = extract(&[&s], &stub, &ctx()).await;
        assert_eq!(report.sources["klepp"].status, SourceStatus::Empty);
        assert_eq!(report.failed(), 0);
    }

    #[tokio::test]
    async fn test_slow_source_times_out() {
        let s = source("treg", CmsFamily::Acos, "https://slow.example/");
        let stub = StubTransport::new().hang("https://slow.example/");
        let mut ctx = ctx();
        ctx.source_timeout = Duration::from_millis(50);
        let report = extract(&[&s], &stub, &ctx).await;
        assert!(matches!(
            report.sources["treg"].status,
            SourceStatus::FetchFailed(FetchError::Timeout { .. })
        ));
    }

    #[tokio::test]
    async fn test_rendered_sources_use_rendered_fetch() {
        let mut s = source("sirdal", CmsFamily::Opengov, "https://r.example/");
        s.fetch = FetchStrategy::Rendered;
        let stub = StubTransport::new().page("https://r.example/", OPENGOV_PAGE);
        extract(&[&s], &stub, &ctx()).await;
        assert_eq!(stub.calls(), vec![("https://r.example/".to_string(), true)]);
    }

    #[tokio::test]
    async fn test_pagination_is_bounded_by_declared_and_cap() {
        let mut s = source("bmp", CmsFamily::Aggregator, "https://bmp.example/moter/");
        s.pagination = Some(Pagination {
            param: "side".to_string(),
            first_page: 1,
            max_pages: 2,
        });
        let stub = StubTransport::new()
            .page("https://bmp.example/moter/", listing(3, &[("Styringsgruppen", "02.10.2025")]))
            .page("https://bmp.example/moter/?side=2", listing(3, &[("Porteføljestyret", "09.10.2025")]))
            .page("https://bmp.example/moter/?side=3", listing(3, &[("Byutvalget", "10.10.2025")]));
        let report = extract(&[&s], &stub, &ctx()).await;
        let r = &report.sources["bmp"];
        assert_eq!(r.pages, 2);
        assert_eq!(r.meetings.len(), 2);
        assert_eq!(stub.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_later_page_failure_keeps_earlier_pages() {
        let mut s = source("bmp", CmsFamily::Aggregator, "https://bmp.example/moter/");
        s.pagination = Some(Pagination {
            param: "side".to_string(),
            first_page: 1,
            max_pages: 10,
        });
        let stub = StubTransport::new()
            .page("https://bmp.example/moter/", listing(3, &[("Styringsgruppen", "02.10.2025")]))
            .reply(
                "https://bmp.example/moter/?side=2",
                Reply::Fail(FetchError::Transport {
                    url: "https://bmp.example/moter/?side=2".to_string(),
                    reason: "connection reset".to_string(),
                }),
            );
        let report = extract(&[&s], &stub, &ctx()).await;
        let r = &report.sources["bmp"];
        assert_eq!(r.status, SourceStatus::Success);
        assert_eq!(r.pages, 1);
        assert_eq!(r.meetings.len(), 1);
    }

    #[tokio::test]
    async fn test_pagination_stops_at_empty_page() {
        let mut s = source("bmp", CmsFamily::Aggregator, "https://bmp.example/moter/");
        s.pagination = Some(Pagination {
            param: "side".to_string(),
            first_page: 1,
            max_pages: 10,
        });
        let stub = StubTransport::new()
            .page("https://bmp.example/moter/", listing(3, &[("Styringsgruppen", "02.10.2025")]))
            .page("https://bmp.example/moter/?side=2", listing(3, &[]))
            .page("https://bmp.example/moter/?side=3", listing(3, &[("Byutvalget", "10.10.2025")]));
        let report = extract(&[&s], &stub, &ctx()).await;
        let r = &report.sources["bmp"];
        assert_eq!(r.status, SourceStatus::Success);
        assert_eq!(r.pages, 1);
        assert_eq!(r.meetings.len(), 1);
        assert_eq!(stub.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_source_without_pagination_fetches_one_page() {
        let s = source("bmp", CmsFamily::Aggregator, "https://bmp.example/moter/");
        let stub = StubTransport::new()
            .page("https://bmp.example/moter/", listing(5, &[("Styringsgruppen", "02.10.2025")]));
        extract(&[&s], &stub, &ctx()).await;
        assert_eq!(stub.calls().len(), 1);
    }
}
