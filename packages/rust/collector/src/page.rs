//! Direct page collector: fetch the listing page and scrape `mailto:` links.
//!
//! Department directories usually render one card per person with the
//! name in a heading and the email as a `mailto:` link. For every such
//! link we walk up a few ancestors looking for the card's name element.

use std::collections::HashSet;
use std::sync::LazyLock;
use std::time::Duration;

use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info, instrument};

use gradreach_shared::{ContactRecord, GradReachError, Result};

use crate::{CollectRequest, Collector};

/// User-Agent string for listing page requests.
const USER_AGENT: &str = concat!("gradreach/", env!("CARGO_PKG_VERSION"));

/// Maximum number of redirects to follow.
const MAX_REDIRECTS: usize = 5;

/// How far up from a `mailto:` link we search for the person's name.
const MAX_CARD_DEPTH: usize = 4;

// Scheme matching is done in `mailto_address`, since hrefs may be `MAILTO:`.
static LINK_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("link selector"));

static NAME_SEL: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("h1, h2, h3, h4, h5, h6, .name, [itemprop=\"name\"], strong")
        .expect("name selector")
});

/// Collector that scrapes the listing page itself.
pub struct PageCollector {
    client: Client,
}

impl PageCollector {
    /// Build a collector with its own HTTP client.
    pub fn new(timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| GradReachError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client })
    }

    async fn fetch(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| GradReachError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(GradReachError::Network(format!("{url}: HTTP {status}")));
        }

        response
            .text()
            .await
            .map_err(|e| GradReachError::Network(format!("{url}: failed to read body: {e}")))
    }
}

impl Collector for PageCollector {
    fn name(&self) -> &str {
        "page"
    }

    #[instrument(skip_all, fields(url = %request.listing_url, attempt = request.attempt))]
    async fn collect(&self, request: &CollectRequest) -> Result<String> {
        let body = self.fetch(request.listing_url.as_str()).await?;
        let contacts = extract_contacts(&body, request.max_count);

        info!(contacts = contacts.len(), "scraped listing page");

        serde_json::to_string(&contacts)
            .map_err(|e| GradReachError::Collector(format!("failed to encode contacts: {e}")))
    }
}

/// Pull `(name, email)` pairs out of a listing page, at most `max_count`.
///
/// Repeated links to the same address (icon + text) collapse into one record.
pub fn extract_contacts(html: &str, max_count: usize) -> Vec<ContactRecord> {
    let doc = Html::parse_document(html);
    let mut seen = HashSet::new();
    let mut contacts = Vec::new();

    for link in doc.select(&LINK_SEL) {
        if contacts.len() >= max_count {
            break;
        }

        let Some(email) = link.value().attr("href").and_then(mailto_address) else {
            continue;
        };
        if !seen.insert(email.to_ascii_lowercase()) {
            continue;
        }

        let name = card_name(link, &email).unwrap_or_else(|| {
            let text = element_text(link);
            if text.contains('@') { String::new() } else { text }
        });

        debug!(%name, %email, "found contact");
        contacts.push(ContactRecord::new(name, Some(email)));
    }

    contacts
}

/// Address part of a `mailto:` href, without query parameters.
fn mailto_address(href: &str) -> Option<String> {
    let rest = href.get(..7)?.eq_ignore_ascii_case("mailto:").then(|| &href[7..])?;
    let address = rest.split('?').next().unwrap_or_default().trim();
    if address.is_empty() {
        None
    } else {
        Some(address.to_string())
    }
}

/// Name shown in the card enclosing `link`, if one can be found.
///
/// An ancestor stops being "the card" once it holds a link to some other
/// address, so a shared page header never lends its heading to a footer link.
fn card_name(link: ElementRef<'_>, email: &str) -> Option<String> {
    for card in link.ancestors().filter_map(ElementRef::wrap).take(MAX_CARD_DEPTH) {
        let shared = card
            .select(&LINK_SEL)
            .filter_map(|a| a.value().attr("href").and_then(mailto_address))
            .any(|other| !other.eq_ignore_ascii_case(email));
        if shared {
            return None;
        }

        let name = card
            .select(&NAME_SEL)
            .map(element_text)
            .find(|text| !text.is_empty() && !text.contains('@'));
        if name.is_some() {
            return name;
        }
    }
    None
}

/// Whitespace-collapsed text content.
fn element_text(el: ElementRef<'_>) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    const LISTING: &str = r#"<html><body>
        <nav><a href="mailto:webmaster@iastate.edu">Contact us</a></nav>
        <div class="person">
            <h3>Waqwoya Abebe</h3>
            <p>PhD Student</p>
            <a href="mailto:wmabebe@iastate.edu"><i class="icon-mail"></i></a>
            <a href="mailto:wmabebe@iastate.edu">wmabebe@iastate.edu</a>
        </div>
        <div class="person">
            <div class="info">
                <span class="name">  Ali
                   Adibifar </span>
                <a href="MAILTO:deris@iastate.edu?subject=Hello">Email</a>
            </div>
        </div>
        <div class="person">
            <h3>Modeste Atsague</h3>
            <p>No email listed</p>
        </div>
        <ul><li><a href="mailto:jobayer@iastate.edu">Jobayer Ahmmed</a></li></ul>
    </body></html>"#;

    #[test]
    fn extracts_names_from_cards() {
        let contacts = extract_contacts(LISTING, 10);
        let pairs: Vec<(&str, &str)> = contacts
            .iter()
            .map(|c| (c.name.as_str(), c.email.as_deref().unwrap()))
            .collect();

        assert_eq!(
            pairs,
            vec![
                ("Contact us", "webmaster@iastate.edu"),
                ("Waqwoya Abebe", "wmabebe@iastate.edu"),
                ("Ali Adibifar", "deris@iastate.edu"),
                ("Jobayer Ahmmed", "jobayer@iastate.edu"),
            ]
        );
    }

    #[test]
    fn respects_max_count() {
        let contacts = extract_contacts(LISTING, 2);
        assert_eq!(contacts.len(), 2);
        assert_eq!(contacts[1].name, "Waqwoya Abebe");
    }

    #[test]
    fn mailto_address_parsing() {
        assert_eq!(mailto_address("mailto:a@x.edu"), Some("a@x.edu".into()));
        assert_eq!(mailto_address("MailTo:a@x.edu?cc=b@x.edu"), Some("a@x.edu".into()));
        assert_eq!(mailto_address("mailto:"), None);
        assert_eq!(mailto_address("https://x.edu"), None);
    }

    #[tokio::test]
    async fn collect_fetches_and_encodes_json() {
        let server = wiremock::MockServer::start().await;

        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/people/phd-students"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_string(LISTING))
            .mount(&server)
            .await;

        let request = CollectRequest {
            instructions: String::new(),
            listing_url: Url::parse(&format!("{}/people/phd-students", server.uri())).unwrap(),
            max_count: 10,
            attempt: 1,
            feedback: None,
        };

        let collector = PageCollector::new(10).unwrap();
        let raw = collector.collect(&request).await.unwrap();
        let records: Vec<ContactRecord> = serde_json::from_str(&raw).unwrap();
        assert_eq!(records.len(), 4);
        assert_eq!(records[1].email.as_deref(), Some("wmabebe@iastate.edu"));
    }

    #[tokio::test]
    async fn collect_reports_http_errors() {
        let server = wiremock::MockServer::start().await;

        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .respond_with(wiremock::ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let request = CollectRequest {
            instructions: String::new(),
            listing_url: Url::parse(&server.uri()).unwrap(),
            max_count: 10,
            attempt: 1,
            feedback: None,
        };

        let collector = PageCollector::new(10).unwrap();
        let err = collector.collect(&request).await.unwrap_err();
        assert!(matches!(err, GradReachError::Network(_)));
        assert!(err.to_string().contains("404"));
    }
}
