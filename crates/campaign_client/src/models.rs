use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum CampaignStatus {
    Active,
    Paused,
    Completed,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Campaign {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand_id: Option<String>,
    pub status: CampaignStatus,
    pub budget: f64,
    pub daily_budget: f64,
    #[serde(default)]
    pub platforms: Vec<String>,
    pub created_at: String,
}

impl Campaign {
    /// Dashboard list filter: case-insensitive name search plus an optional
    /// status. An empty search matches every name.
    pub fn matches(&self, search: &str, status: Option<CampaignStatus>) -> bool {
        let name_matches = self
            .name
            .to_lowercase()
            .contains(&search.trim().to_lowercase());
        name_matches && status.is_none_or(|wanted| self.status == wanted)
    }
}

/// Performance numbers for one campaign; also the payload of every live
/// update event.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(default)]
pub struct CampaignInsights {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub campaign_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    pub impressions: u64,
    pub clicks: u64,
    pub conversions: u64,
    pub spend: f64,
    pub ctr: f64,
    pub cpc: f64,
    pub conversion_rate: f64,
}

/// Totals and averages across all campaigns.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(default)]
pub struct AggregateInsights {
    pub total_campaigns: u64,
    pub active_campaigns: u64,
    pub paused_campaigns: u64,
    pub completed_campaigns: u64,
    pub total_impressions: u64,
    pub total_clicks: u64,
    pub total_conversions: u64,
    pub total_spend: f64,
    pub avg_ctr: f64,
    pub avg_cpc: f64,
    pub avg_conversion_rate: f64,
}

/// Everything the dashboard view loads at once.
#[derive(Debug, Clone, PartialEq)]
pub struct Dashboard {
    pub campaigns: Vec<Campaign>,
    pub insights: AggregateInsights,
}

impl Dashboard {
    pub fn filtered<'a>(
        &'a self,
        search: &'a str,
        status: Option<CampaignStatus>,
    ) -> impl Iterator<Item = &'a Campaign> + 'a {
        self.campaigns
            .iter()
            .filter(move |campaign| campaign.matches(search, status))
    }
}

/// Everything the campaign detail view loads at once.
#[derive(Debug, Clone, PartialEq)]
pub struct CampaignDetail {
    pub campaign: Campaign,
    pub insights: CampaignInsights,
}

impl CampaignDetail {
    pub fn remaining_budget(&self) -> f64 {
        self.campaign.budget - self.insights.spend
    }

    /// Spend as a percentage of budget; `None` for a zero budget.
    pub fn budget_utilization(&self) -> Option<f64> {
        (self.campaign.budget > 0.0).then(|| self.insights.spend / self.campaign.budget * 100.0)
    }

    /// `None` until the campaign has converted at least once.
    pub fn cost_per_conversion(&self) -> Option<f64> {
        (self.insights.conversions > 0).then(|| self.insights.spend / self.insights.conversions as f64)
    }
}

#[derive(Deserialize, Debug)]
pub(crate) struct CampaignsResponse {
    pub campaigns: Vec<Campaign>,
}

#[derive(Deserialize, Debug)]
pub(crate) struct CampaignResponse {
    pub campaign: Campaign,
}

#[derive(Deserialize, Debug)]
pub(crate) struct InsightsResponse {
    pub insights: AggregateInsights,
}

#[derive(Deserialize, Debug)]
pub(crate) struct CampaignInsightsResponse {
    pub insights: CampaignInsights,
}
