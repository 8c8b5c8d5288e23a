use anyhow::{anyhow, Context, Result};
use clap::Parser;
use parking_lot::RwLock;
use reqwest::{header, Client, Url};
use scraper::{Html, Selector};
use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::sync::Arc;
use std::time::Duration;
use time::format_description::well_known::Rfc3339;
use tokio::time::sleep;
use tracing_subscriber::{fmt, EnvFilter};

const DEFAULT_DELAY_MS: u64 = 1_000;
const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;
const NO_TITLE: &str = "No title found";
const NO_DESCRIPTION: &str = "No description found";

#[derive(Parser, Debug)]
#[command(name = "crawler")]
#[command(about = "Crawl one site to JSONL product records, respecting robots.txt")]
struct Cli {
    /// Start URL; only links on its host are followed
    #[arg(long)]
    base_url: String,
    /// Output JSONL file path
    #[arg(long, default_value = "./sample_data/products.jsonl")]
    output: String,
    /// Maximum number of pages to emit
    #[arg(long, default_value_t = 50)]
    max_pages: usize,
    /// Request timeout seconds
    #[arg(long, default_value_t = 12)]
    timeout_secs: u64,
    /// User-Agent string to use for robots.txt and crawling
    #[arg(long, default_value = "product-search-bot/0.1")]
    user_agent: String,
}

#[derive(Debug, Clone, Default)]
struct Robots {
    allows: Vec<String>,
    disallows: Vec<String>,
    crawl_delay_ms: Option<u64>,
}

type RobotsCache = Arc<RwLock<HashMap<String, Robots>>>;

/// Two FIFO queues; URLs mentioning `product` are always served first.
#[derive(Default)]
struct Frontier {
    priority: VecDeque<String>,
    regular: VecDeque<String>,
    queued: HashSet<String>,
    visited: HashSet<String>,
}

impl Frontier {
    fn push(&mut self, url: String) {
        if self.visited.contains(&url) || self.queued.contains(&url) {
            return;
        }
        self.queued.insert(url.clone());
        if url.contains("product") {
            self.priority.push_back(url);
        } else {
            self.regular.push_back(url);
        }
    }

    /// Next unvisited URL, marked visited.
    fn pop(&mut self) -> Option<String> {
        let url = self.priority.pop_front().or_else(|| self.regular.pop_front())?;
        self.queued.remove(&url);
        self.visited.insert(url.clone());
        Some(url)
    }

    fn pending(&self) -> usize {
        self.priority.len() + self.regular.len()
    }
}

#[derive(Debug, Serialize)]
struct PageRecord {
    url: String,
    title: String,
    description: String,
    links: Vec<String>,
    crawled_at: String,
}

struct Extractor {
    title: Selector,
    paragraph: Selector,
    anchor: Selector,
}

impl Extractor {
    fn new() -> Result<Self> {
        let parse = |css: &str| Selector::parse(css).map_err(|e| anyhow!("bad selector {css:?}: {e:?}"));
        Ok(Self { title: parse("title")?, paragraph: parse("p")?, anchor: parse("a[href]")? })
    }

    fn page(&self, body: &str, page_url: &Url, host: &str) -> PageRecord {
        let doc = Html::parse_document(body);
        let title = doc
            .select(&self.title)
            .next()
            .map(|n| n.text().collect::<String>().trim().to_string())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| NO_TITLE.to_string());
        let description = doc
            .select(&self.paragraph)
            .next()
            .map(|n| n.text().map(str::trim).filter(|s| !s.is_empty()).collect::<Vec<_>>().join(" "))
            .unwrap_or_else(|| NO_DESCRIPTION.to_string());

        let mut links = Vec::new();
        let mut seen = HashSet::new();
        for a in doc.select(&self.anchor) {
            let Some(href) = a.value().attr("href") else { continue };
            if href.starts_with('#') {
                continue;
            }
            let Ok(u) = page_url.join(href) else { continue };
            if !u.scheme().starts_with("http") || u.host_str() != Some(host) {
                continue;
            }
            let key = norm(&u);
            if seen.insert(key.clone()) {
                links.push(key);
            }
        }

        PageRecord {
            url: norm(page_url),
            title,
            description,
            links,
            crawled_at: time::OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Cli::parse();
    if let Some(dir) = std::path::Path::new(&args.output).parent() {
        fs::create_dir_all(dir)?;
    }

    let base = Url::parse(&args.base_url).with_context(|| format!("invalid base url {}", args.base_url))?;
    let host = base.host_str().ok_or_else(|| anyhow!("base url has no host"))?.to_string();

    let client = Client::builder()
        .user_agent(args.user_agent.clone())
        .redirect(reqwest::redirect::Policy::limited(5))
        .timeout(Duration::from_secs(args.timeout_secs))
        .build()?;
    let extractor = Extractor::new()?;
    let robots_cache: RobotsCache = Arc::new(RwLock::new(HashMap::new()));

    let mut out = BufWriter::new(File::create(&args.output)?);
    let mut frontier = Frontier::default();
    frontier.push(norm(&base));
    tracing::info!(base = %base, max_pages = args.max_pages, output = %args.output, "crawl started");

    let mut emitted = 0usize;
    while emitted < args.max_pages {
        let Some(next) = frontier.pop() else { break };
        let Ok(url) = Url::parse(&next) else { continue };

        if !allowed(&client, &robots_cache, &url, &args.user_agent).await {
            tracing::debug!(%url, "disallowed by robots.txt");
            continue;
        }
        let delay = robots_delay(&robots_cache, &url).unwrap_or(DEFAULT_DELAY_MS);
        sleep(Duration::from_millis(delay)).await;

        let body = match fetch_html(&client, &url).await {
            Ok(Some(body)) => body,
            Ok(None) => continue,
            Err(err) => {
                tracing::warn!(%url, %err, "fetch failed");
                continue;
            }
        };

        let record = extractor.page(&body, &url, &host);
        for link in &record.links {
            frontier.push(link.clone());
        }
        serde_json::to_writer(&mut out, &record)?;
        out.write_all(b"\n")?;
        emitted += 1;
        if emitted % 10 == 0 {
            tracing::info!(emitted, visited = frontier.visited.len(), pending = frontier.pending(), "progress");
        }
    }
    out.flush()?;

    tracing::info!(
        emitted,
        visited = frontier.visited.len(),
        pending = frontier.pending(),
        output = %args.output,
        "crawl done"
    );
    Ok(())
}

/// HTML body of `url`, or `None` for non-success, non-HTML or oversized responses.
async fn fetch_html(client: &Client, url: &Url) -> Result<Option<String>> {
    let resp = client.get(url.clone()).send().await?;
    if !resp.status().is_success() {
        tracing::debug!(%url, status = %resp.status(), "skipping non-success response");
        return Ok(None);
    }
    if let Some(ct) = resp.headers().get(header::CONTENT_TYPE) {
        if let Ok(v) = ct.to_str() {
            if !v.starts_with("text/html") {
                return Ok(None);
            }
        }
    }
    let bytes = resp.bytes().await?;
    if bytes.len() > MAX_BODY_BYTES {
        return Ok(None);
    }
    Ok(Some(String::from_utf8_lossy(&bytes).into_owned()))
}

/// Drop the fragment and any trailing `/`.
fn norm(u: &Url) -> String {
    let mut s = u.clone();
    s.set_fragment(None);
    s.to_string().trim_end_matches('/').to_string()
}

fn parse_robots(txt: &str) -> Robots {
    // minimal parser for the '*' group
    let mut active = false;
    let mut robots = Robots::default();
    for line in txt.lines() {
        let l = line.split('#').next().unwrap_or_default().trim();
        if l.is_empty() { continue; }
        if let Some((k, v)) = l.split_once(':') {
            let key = k.trim().to_lowercase();
            let val = v.trim();
            match key.as_str() {
                "user-agent" => { active = val == "*"; }
                "allow" if active && !val.is_empty() => robots.allows.push(val.to_string()),
                "disallow" if active && !val.is_empty() => robots.disallows.push(val.to_string()),
                "crawl-delay" if active => {
                    if let Ok(n) = val.parse::<f64>() { robots.crawl_delay_ms = Some((n * 1000.0) as u64); }
                }
                _ => {}
            }
        }
    }
    robots
}

async fn allowed(client: &Client, cache: &RobotsCache, url: &Url, ua: &str) -> bool {
    let Some(host) = url.host_str().map(str::to_string) else { return false };
    let cached = { cache.read().get(&host).cloned() };
    let rules = match cached {
        Some(r) => r,
        None => {
            let Ok(robots_url) = url.join("/robots.txt") else { return false };
            let txt = match client.get(robots_url).header(header::USER_AGENT, ua).send().await {
                Ok(resp) if resp.status().is_success() => resp.text().await.unwrap_or_default(),
                _ => String::new(),
            };
            let parsed = parse_robots(&txt);
            tracing::debug!(%host, allows = parsed.allows.len(), disallows = parsed.disallows.len(), "robots.txt loaded");
            cache.write().insert(host, parsed.clone());
            parsed
        }
    };
    path_allowed(url.path(), &rules)
}

fn robots_delay(cache: &RobotsCache, url: &Url) -> Option<u64> {
    let host = url.host_str()?;
    cache.read().get(host).and_then(|r| r.crawl_delay_ms)
}

/// Longest matching rule wins; Allow wins a tie.
fn path_allowed(path: &str, rules: &Robots) -> bool {
    let longest = |patterns: &[String]| patterns.iter().filter(|p| path.starts_with(p.as_str())).map(String::len).max();
    match (longest(rules.allows.as_slice()), longest(rules.disallows.as_slice())) {
        (Some(a), Some(d)) => a >= d,
        (_, None) => true,
        (None, Some(_)) => false,
    }
}
