//! SEC EDGAR 13F-HR retrieval
//!
//! Two-request flow: the browse page for the filer's latest 13F-HR links
//! to the filing's information-table XML, which carries one `infoTable`
//! element per holding. Field extraction is regex-based since filers vary
//! the namespace prefix on otherwise identical documents.

use anyhow::{anyhow, Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::blocking::Client;
use rust_decimal::Decimal;
use scraper::{Html, Selector};
use std::str::FromStr;
use tracing::{info, warn};

const SEC_BASE: &str = "https://www.sec.gov";

static XML_LINK_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\.xml$").unwrap());

static INFO_TABLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<(?:\w+:)?infoTable[^>]*>(.*?)</(?:\w+:)?infoTable>").unwrap());
static ISSUER_RE: Lazy<Regex> = Lazy::new(|| field_regex("nameOfIssuer"));
static CUSIP_RE: Lazy<Regex> = Lazy::new(|| field_regex("cusip"));
static VALUE_RE: Lazy<Regex> = Lazy::new(|| field_regex("value"));
static SHARES_RE: Lazy<Regex> = Lazy::new(|| field_regex("sshPrnamt"));

fn field_regex(tag: &str) -> Regex {
    Regex::new(&format!(
        r"(?s)<(?:\w+:)?{tag}[^>]*>\s*(.*?)\s*</(?:\w+:)?{tag}>"
    ))
    .unwrap()
}

/// One holding parsed from the 13F information table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilingHolding {
    pub issuer: String,
    pub cusip: String,
    pub shares: i64,
    pub value: Decimal,
}

fn http_client(user_agent: &str) -> Result<Client> {
    Client::builder()
        .user_agent(user_agent)
        .build()
        .context("Failed to build EDGAR HTTP client")
}

/// Fetch and parse the filer's most recent 13F-HR information table.
pub fn fetch_latest_holdings(cik: &str, user_agent: &str) -> Result<Vec<FilingHolding>> {
    let client = http_client(user_agent)?;

    let browse_url = format!(
        "{}/cgi-bin/browse-edgar?action=getcompany&CIK={}&type=13F-HR&dateb=&owner=exclude&count=1",
        SEC_BASE, cik
    );
    info!("Fetching latest 13F-HR index for CIK {}", cik);

    let page = client
        .get(&browse_url)
        .send()
        .context("Failed to reach SEC EDGAR")?
        .error_for_status()
        .context("EDGAR browse page returned error status")?
        .text()
        .context("Failed to read EDGAR browse page")?;

    let xml_href = find_info_table_link(&page)
        .ok_or_else(|| anyhow!("Could not find a 13F XML document link for CIK {}", cik))?;

    let xml_url = if xml_href.starts_with("http") {
        xml_href
    } else {
        format!("{}{}", SEC_BASE, xml_href)
    };
    info!("Fetching 13F information table: {}", xml_url);

    let xml = client
        .get(&xml_url)
        .send()
        .context("Failed to fetch 13F XML document")?
        .error_for_status()
        .context("13F XML document returned error status")?
        .text()
        .context("Failed to read 13F XML document")?;

    let holdings = parse_info_tables(&xml);
    if holdings.is_empty() {
        warn!("13F document for CIK {} parsed to zero holdings", cik);
    }
    Ok(holdings)
}

/// First `.xml` link on the browse page. EDGAR lists the information
/// table ahead of the primary document for 13F filings.
fn find_info_table_link(page: &str) -> Option<String> {
    let document = Html::parse_document(page);
    let anchors = Selector::parse("a[href]").ok()?;

    document
        .select(&anchors)
        .filter_map(|a| a.value().attr("href"))
        .find(|href| XML_LINK_RE.is_match(href))
        .map(str::to_string)
}

/// Extract holdings from information-table XML. Malformed entries are
/// skipped, not fatal: one bad row must not cost the rest of the filing.
pub fn parse_info_tables(xml: &str) -> Vec<FilingHolding> {
    let mut holdings = Vec::new();

    for captures in INFO_TABLE_RE.captures_iter(xml) {
        let block = &captures[1];
        match parse_holding_block(block) {
            Ok(holding) => holdings.push(holding),
            Err(e) => {
                warn!("Skipping malformed 13F info table entry: {}", e);
            }
        }
    }

    holdings
}

fn parse_holding_block(block: &str) -> Result<FilingHolding> {
    let field = |re: &Regex, name: &str| -> Result<String> {
        re.captures(block)
            .map(|c| c[1].trim().to_string())
            .ok_or_else(|| anyhow!("missing <{}>", name))
    };

    let issuer = field(&ISSUER_RE, "nameOfIssuer")?;
    let cusip = field(&CUSIP_RE, "cusip")?;

    let shares_raw = field(&SHARES_RE, "sshPrnamt")?;
    let shares = i64::from_str(&shares_raw.replace(',', ""))
        .with_context(|| format!("bad share count '{}' for {}", shares_raw, issuer))?;

    let value_raw = field(&VALUE_RE, "value")?;
    let value = Decimal::from_str(&value_raw.replace(',', ""))
        .with_context(|| format!("bad value '{}' for {}", value_raw, issuer))?;

    Ok(FilingHolding {
        issuer,
        cusip,
        shares,
        value,
    })
}
