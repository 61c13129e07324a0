//! Copy for outgoing emails and push notifications.

use crate::domains::chatrooms::Message;
use crate::domains::join_requests::models::JoinRequest;

pub struct EmailContent {
    pub subject: String,
    pub body: String,
}

pub struct PushContent {
    pub title: String,
    pub body: String,
}

fn format_amount(request: &JoinRequest) -> Option<String> {
    let cents = request.amount_cents?;
    let currency = request.currency.as_deref().unwrap_or("EUR").to_uppercase();
    Some(format!("{}.{:02} {}", cents / 100, (cents % 100).abs(), currency))
}

pub fn request_created_email(request: &JoinRequest) -> EmailContent {
    let amount = format_amount(request)
        .map(|a| format!(" pour {}", a))
        .unwrap_or_default();
    EmailContent {
        subject: format!("Nouvelle demande pour {}", request.group_name),
        body: format!(
            "<p>{} souhaite rejoindre <strong>{}</strong> ({}){}.</p>",
            request.member_email, request.group_name, request.event_slug, amount
        ),
    }
}

pub fn request_created_push(request: &JoinRequest) -> PushContent {
    PushContent {
        title: "Nouvelle demande".to_string(),
        body: format!("{} veut rejoindre {}", request.member_email, request.group_name),
    }
}

pub fn request_accepted_email(request: &JoinRequest) -> EmailContent {
    EmailContent {
        subject: format!("Bienvenue dans {}", request.group_name),
        body: format!(
            "<p>Ta demande pour <strong>{}</strong> ({}) a été acceptée. Présente ton QR code à l'entrée.</p>",
            request.group_name, request.event_slug
        ),
    }
}

pub fn request_accepted_push(request: &JoinRequest) -> PushContent {
    PushContent {
        title: "Demande acceptée".to_string(),
        body: format!("Tu fais partie de {}", request.group_name),
    }
}

pub fn request_refused_email(request: &JoinRequest) -> EmailContent {
    EmailContent {
        subject: format!("Ta demande pour {}", request.group_name),
        body: format!(
            "<p>Ta demande pour <strong>{}</strong> ({}) n'a pas été retenue.</p>",
            request.group_name, request.event_slug
        ),
    }
}

pub fn payout_email(request: &JoinRequest) -> EmailContent {
    let amount = format_amount(request).unwrap_or_else(|| "aucun montant".to_string());
    EmailContent {
        subject: format!("{} est arrivé", request.member_email),
        body: format!(
            "<p>{} a été scanné à l'entrée de {}. Paiement libéré : {}.</p>",
            request.member_email, request.event_slug, amount
        ),
    }
}

pub fn payout_push(request: &JoinRequest) -> PushContent {
    PushContent {
        title: "Membre scanné".to_string(),
        body: match format_amount(request) {
            Some(amount) => format!("{} crédités sur ton portefeuille", amount),
            None => format!("{} est entré", request.member_email),
        },
    }
}

pub fn message_push(message: &Message, group_name: &str) -> PushContent {
    PushContent {
        title: format!("{} · {}", message.sender_name, group_name),
        body: message.content.chars().take(140).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::join_requests::models::NewJoinRequest;

    #[test]
    fn test_amount_formatting() {
        let request = NewJoinRequest {
            event_slug: "techno-paris".into(),
            group_name: "Crew 1".into(),
            member_email: "a@x.com".into(),
            amount_cents: Some(1505),
            currency: Some("eur".into()),
            method: None,
        }
        .into_pending();

        assert_eq!(format_amount(&request).as_deref(), Some("15.05 EUR"));
        assert!(payout_push(&request).body.starts_with("15.05 EUR"));
    }
}
