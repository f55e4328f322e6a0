//! Profile and route resolution, plus output rendering
//!
//! A [`RoutingContext`] is built once from configuration and passed through
//! the pipeline; there is no process-wide profile state. Resolution never
//! fails: absent configuration degrades to the bot's default destination
//! list with the canonical template.

use crate::config::{Config, ParseOptions, Profile};
use crate::types::{ChannelId, Side, Signal};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone)]
struct CompiledProfile {
    name: String,
    members: HashSet<ChannelId>,
    destinations: Vec<ChannelId>,
    options: ParseOptions,
    templates: HashMap<ChannelId, String>,
    routes: HashMap<String, Vec<ChannelId>>,
}

impl CompiledProfile {
    fn compile(name: &str, profile: &Profile) -> Self {
        Self {
            name: name.to_string(),
            members: profile
                .member_channels
                .iter()
                .map(|s| ChannelId::parse(s))
                .collect(),
            destinations: profile
                .destinations
                .iter()
                .map(|s| ChannelId::parse(s))
                .collect(),
            options: profile.options,
            templates: profile
                .templates
                .iter()
                .map(|(k, v)| (ChannelId::parse(k), v.clone()))
                .collect(),
            routes: profile
                .routes
                .iter()
                .map(|(k, v)| {
                    (
                        k.to_uppercase(),
                        v.iter().map(|s| ChannelId::parse(s)).collect(),
                    )
                })
                .collect(),
        }
    }
}

/// One resolved delivery target.
#[derive(Debug, Clone, PartialEq)]
pub struct Destination {
    pub channel: ChannelId,
    /// Template body to render instead of the canonical format.
    pub template: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RoutingContext {
    default_destinations: Vec<ChannelId>,
    profiles: Vec<CompiledProfile>,
    active: Option<String>,
}

impl RoutingContext {
    pub fn new(config: &Config) -> Self {
        Self {
            default_destinations: config.destination_channels(),
            profiles: config
                .profiles
                .iter()
                .map(|(name, p)| CompiledProfile::compile(name, p))
                .collect(),
            active: config.active_profile.clone(),
        }
    }

    /// Swap handle-form member ids for their resolved numeric ids, so
    /// profile membership can match incoming chat ids. Incoming messages
    /// only ever carry numeric ids; a handle member is unmatchable until
    /// the transport has resolved it.
    pub fn apply_resolved(&mut self, resolved: &HashMap<String, i64>) {
        for profile in &mut self.profiles {
            profile.members = profile
                .members
                .drain()
                .map(|member| resolve_channel(member, resolved))
                .collect();
        }
    }

    fn profile_for(&self, chat_id: i64) -> Option<&CompiledProfile> {
        let id = ChannelId::from(chat_id);
        self.profiles
            .iter()
            .find(|p| p.members.contains(&id))
            .or_else(|| {
                let active = self.active.as_deref()?;
                self.profiles.iter().find(|p| p.name == active)
            })
    }

    /// Parse options for a source; defaults when no profile claims it.
    pub fn options_for(&self, chat_id: i64) -> ParseOptions {
        self.profile_for(chat_id)
            .map(|p| p.options)
            .unwrap_or_default()
    }

    /// Resolve destinations for a parsed signal. Route overrides keyed by
    /// `"SYMBOL:SIDE"` replace the destination set entirely; otherwise the
    /// profile's destinations apply, then the bot defaults.
    pub fn resolve(&self, signal: &Signal) -> Vec<Destination> {
        let profile = self.profile_for(signal.source_chat_id);
        let channels: Vec<ChannelId> = match profile {
            Some(p) => {
                let key = route_key(&signal.symbol, signal.side);
                if let Some(routed) = p.routes.get(&key) {
                    routed.clone()
                } else if !p.destinations.is_empty() {
                    p.destinations.clone()
                } else {
                    self.default_destinations.clone()
                }
            }
            None => self.default_destinations.clone(),
        };
        channels
            .into_iter()
            .map(|channel| Destination {
                template: profile.and_then(|p| p.templates.get(&channel).cloned()),
                channel,
            })
            .collect()
    }
}

/// Replace a handle-form id with its resolved numeric id, if known.
pub fn resolve_channel(id: ChannelId, resolved: &HashMap<String, i64>) -> ChannelId {
    match id {
        ChannelId::Handle(h) => match resolved.get(&h) {
            Some(&num) => ChannelId::Id(num),
            None => ChannelId::Handle(h),
        },
        other => other,
    }
}

fn route_key(symbol: &str, side: Side) -> String {
    format!("{}:{}", symbol.to_uppercase(), side.to_string().to_uppercase())
}

/// Render the canonical output template.
pub fn format_signal(signal: &Signal, options: &ParseOptions) -> String {
    let mut lines = vec![
        format!("📊 #{}", signal.symbol),
        format!("📉 Position: {}", signal.side),
    ];
    if !options.skip_risk_reward {
        if let Some(rr) = &signal.risk_reward {
            lines.push(format!("❗️ R/R : {rr}"));
        }
    }
    let show_price = !(options.show_entry_range_only && signal.entry.is_range());
    if show_price {
        lines.push(format!("💲 Entry Price : {}", signal.entry.reference()));
    }
    if signal.entry.is_range() {
        lines.push(format!(
            "🎯 Entry Range : {} – {}",
            signal.entry.low(),
            signal.entry.high()
        ));
    }
    for (i, tp) in signal.take_profits.iter().enumerate() {
        lines.push(format!("✔️ TP{} : {}", i + 1, tp));
    }
    lines.push(format!("🚫 Stop Loss : {}", signal.stop_loss));
    lines.join("\n")
}

/// Substitute `{placeholder}` fields in a profile template.
pub fn render_template(template: &str, signal: &Signal) -> String {
    let targets = signal
        .take_profits
        .iter()
        .map(|tp| tp.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    template
        .replace("{symbol}", &signal.symbol)
        .replace("{side}", &signal.side.to_string())
        .replace("{entry}", &signal.entry.reference().to_string())
        .replace("{entry_low}", &signal.entry.low().to_string())
        .replace("{entry_high}", &signal.entry.high().to_string())
        .replace("{targets}", &targets)
        .replace("{stop}", &signal.stop_loss.to_string())
        .replace("{rr}", signal.risk_reward.as_deref().unwrap_or("-"))
}

/// Pick the outgoing text for one destination.
pub fn render_for(dest: &Destination, signal: &Signal, options: &ParseOptions) -> String {
    match &dest.template {
        Some(tpl) => render_template(tpl, signal),
        None => format_signal(signal, options),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Entry, RangeAnchor};
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    fn signal(symbol: &str, side: Side) -> Signal {
        Signal {
            symbol: symbol.to_string(),
            side,
            entry: Entry::Point(dec!(1900)),
            stop_loss: dec!(1895),
            take_profits: vec![dec!(1910)],
            risk_reward: Some("1/2".to_string()),
            source_chat_id: -1001,
            raw_text: String::new(),
        }
    }

    fn context(profiles: HashMap<String, Profile>, active: Option<&str>) -> RoutingContext {
        let cfg = Config {
            telegram: crate::config::Credentials {
                api_id: 1,
                api_hash: "h".to_string(),
                session_token: Some("t".to_string()),
            },
            sources: vec![],
            destinations: vec!["555".to_string()],
            profiles,
            active_profile: active.map(|s| s.to_string()),
            dedup: Default::default(),
            supervisor: Default::default(),
            delivery: Default::default(),
        };
        RoutingContext::new(&cfg)
    }

    #[test]
    fn test_resolution_defaults_without_profiles() {
        let ctx = context(HashMap::new(), None);
        let dests = ctx.resolve(&signal("XAUUSD", Side::Buy));
        assert_eq!(dests.len(), 1);
        assert_eq!(dests[0].channel, ChannelId::Id(-100555));
        assert!(dests[0].template.is_none());
    }

    #[test]
    fn test_route_override_replaces_destinations() {
        let mut routes = HashMap::new();
        routes.insert("XAUUSD:BUY".to_string(), vec!["666".to_string()]);
        let profile = Profile {
            routes,
            ..Default::default()
        };
        let mut profiles = HashMap::new();
        profiles.insert("default".to_string(), profile);
        let ctx = context(profiles, Some("default"));

        let routed = ctx.resolve(&signal("XAUUSD", Side::Buy));
        assert_eq!(routed[0].channel, ChannelId::Id(-100666));

        // No route for Sell: falls back to the bot defaults.
        let fallback = ctx.resolve(&signal("XAUUSD", Side::Sell));
        assert_eq!(fallback[0].channel, ChannelId::Id(-100555));
    }

    #[test]
    fn test_member_profile_destinations_win() {
        let profile = Profile {
            member_channels: vec!["-1001".to_string()],
            destinations: vec!["777".to_string()],
            ..Default::default()
        };
        let mut profiles = HashMap::new();
        profiles.insert("gold".to_string(), profile);
        let ctx = context(profiles, None);

        let dests = ctx.resolve(&signal("XAUUSD", Side::Buy));
        assert_eq!(dests[0].channel, ChannelId::Id(-100777));
    }

    #[test]
    fn test_handle_members_match_after_resolution() {
        let profile = Profile {
            member_channels: vec!["@goldvip".to_string()],
            destinations: vec!["777".to_string()],
            ..Default::default()
        };
        let mut profiles = HashMap::new();
        profiles.insert("gold".to_string(), profile);
        let mut ctx = context(profiles, None);

        let mut s = signal("XAUUSD", Side::Buy);
        s.source_chat_id = -100123;

        // Unresolved handle cannot match a numeric chat id.
        assert_eq!(ctx.resolve(&s)[0].channel, ChannelId::Id(-100555));

        let mut resolved = HashMap::new();
        resolved.insert("goldvip".to_string(), -100123_i64);
        ctx.apply_resolved(&resolved);

        assert_eq!(ctx.resolve(&s)[0].channel, ChannelId::Id(-100777));
    }

    #[test]
    fn test_template_attached_per_destination() {
        let mut templates = HashMap::new();
        templates.insert("555".to_string(), "{symbol} {side} @{entry}".to_string());
        let profile = Profile {
            templates,
            ..Default::default()
        };
        let mut profiles = HashMap::new();
        profiles.insert("default".to_string(), profile);
        let ctx = context(profiles, Some("default"));

        let dests = ctx.resolve(&signal("XAUUSD", Side::Buy));
        let text = render_for(&dests[0], &signal("XAUUSD", Side::Buy), &ParseOptions::default());
        assert_eq!(text, "XAUUSD Buy @1900");
    }

    #[test]
    fn test_canonical_format() {
        let s = signal("XAUUSD", Side::Buy);
        let out = format_signal(&s, &ParseOptions::default());
        assert_eq!(
            out,
            "📊 #XAUUSD\n📉 Position: Buy\n❗️ R/R : 1/2\n💲 Entry Price : 1900\n✔️ TP1 : 1910\n🚫 Stop Loss : 1895"
        );
    }

    #[test]
    fn test_skip_risk_reward_hides_line() {
        let s = signal("XAUUSD", Side::Buy);
        let opts = ParseOptions {
            skip_risk_reward: true,
            ..Default::default()
        };
        assert!(!format_signal(&s, &opts).contains("R/R"));
    }

    #[test]
    fn test_range_lines() {
        let mut s = signal("XAUUSD", Side::Buy);
        s.entry = Entry::range(dec!(1900), dec!(1910), RangeAnchor::Midpoint);
        s.take_profits = vec![dec!(1915)];

        let opts = ParseOptions {
            allow_entry_range: true,
            ..Default::default()
        };
        let out = format_signal(&s, &opts);
        assert!(out.contains("💲 Entry Price : 1905"));
        assert!(out.contains("🎯 Entry Range : 1900 – 1910"));

        let only_range = ParseOptions {
            allow_entry_range: true,
            show_entry_range_only: true,
            ..Default::default()
        };
        let out = format_signal(&s, &only_range);
        assert!(!out.contains("Entry Price"));
        assert!(out.contains("Entry Range"));
    }

    #[test]
    fn test_show_entry_range_only_without_range_shows_price() {
        let s = signal("BTCUSD", Side::Buy);
        let opts = ParseOptions {
            show_entry_range_only: true,
            ..Default::default()
        };
        assert!(format_signal(&s, &opts).contains("Entry Price"));
    }
}
