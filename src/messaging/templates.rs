//! Order emails.

use std::fmt::Write;

use crate::domain::aggregates::{Order, OrderStatus, User};
use crate::messaging::Email;

const STYLE: &str = "body{font-family:Arial,sans-serif;background:#f4f4f4;margin:0;padding:0}\
.container{max-width:600px;margin:20px auto;background:#fff;padding:20px;border-radius:8px}\
table{width:100%;border-collapse:collapse}th,td{padding:8px;border-bottom:1px solid #ddd;text-align:left}\
.button{display:inline-block;padding:10px 20px;background:#007bff;color:#fff;text-decoration:none;border-radius:5px}\
.status{padding:4px 8px;border-radius:4px;color:#fff}.status.processing{background:#ffb6ff}\
.status.shipped{background:#d97aff}.status.delivered{background:#28a745}.status.cancelled{background:#dc3545}";

fn page(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html><html><head><meta charset=\"UTF-8\"><title>{title}</title><style>{STYLE}</style></head>\
         <body><div class=\"container\">{body}</div></body></html>"
    )
}

fn line_table(order: &Order) -> String {
    let mut rows = String::new();
    for line in order.products() {
        let _ = write!(rows, "<tr><td>{}</td><td>{}</td><td>{}</td></tr>", escape(&line.name), line.quantity, line.final_price);
    }
    format!(
        "<p><strong>Order ID:</strong> #{id}</p><table><tr><th>Product</th><th>Qty</th><th>Price</th></tr>{rows}</table>\
         <p><strong>Total:</strong> {total}</p>",
        id = order.id(),
        total = order.totals().final_amount,
    )
}

fn escape(raw: &str) -> String {
    raw.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;").replace('"', "&quot;")
}

pub fn order_placed(order: &Order, customer: &User, base_url: &str) -> Email {
    let body = format!(
        "<h2>Order Confirmation</h2><p>Dear <strong>{name}</strong>,</p><p>Thank you for your order! We are processing it now.</p>\
         {lines}<a href=\"{base_url}/order/{id}\" class=\"button\">View Your Order</a>",
        name = escape(&customer.name),
        lines = line_table(order),
        id = order.id(),
    );
    Email { to: customer.email.clone(), subject: format!("Order #{} confirmed", order.id()), html: page("Order Confirmation", &body) }
}

/// Email for an admin status change, worded per target status.
pub fn status_update(order: &Order, customer: &User, base_url: &str) -> Email {
    let name = escape(&customer.name);
    let id = order.id();
    let (subject, title, body) = match order.status() {
        OrderStatus::Delivered => (
            format!("Your Order #{id} has been Delivered!"),
            "Order Delivered",
            format!(
                "<h2>Your Order Has Been Delivered!</h2><p>Dear <strong>{name}</strong>,</p>\
                 <p>Your order <strong>#{id}</strong> has been successfully delivered.</p>\
                 <p>We hope you love your purchase! If you have any issues, feel free to contact us.</p>\
                 <a href=\"{base_url}/order/{id}\" class=\"button\">View Your Order</a>"
            ),
        ),
        OrderStatus::Cancelled => (
            format!("Your Order #{id} has been Cancelled"),
            "Order Cancelled",
            format!(
                "<h2>Order Cancelled</h2><p>Dear <strong>{name}</strong>,</p>\
                 <p>We regret to inform you that your order <strong>#{id}</strong> has been cancelled.</p>\
                 <p>If you were charged, we will process a refund shortly.</p>\
                 <a href=\"{base_url}/support\" class=\"button\">Contact Support</a>"
            ),
        ),
        status => (
            format!("Your Order #{id} has been {status}"),
            "Order Update",
            format!(
                "<h2>Order Update</h2><p>Dear <strong>{name}</strong>,</p><p>Your order status has been updated.</p>{lines}\
                 <p>Your order status: <span class=\"status {class}\">{status}</span></p>\
                 <a href=\"{base_url}/order/{id}\" class=\"button\">Track Your Order</a>",
                lines = line_table(order),
                class = status.as_str().to_lowercase(),
            ),
        ),
    };
    Email { to: customer.email.clone(), subject, html: page(title, &body) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::address::tests::address;
    use crate::domain::aggregates::product::tests::product;
    use crate::domain::aggregates::{Cart, PaymentMethod};
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn order() -> (Order, User) {
        let user = User::register("Asha <Admin>", "asha@example.com", None).unwrap();
        let lamp = product("Lamp", Uuid::now_v7(), dec!(500), 5);
        let mut cart = Cart::new(user.id);
        cart.add_item(&lamp, 2).unwrap();
        let order = Order::from_cart(&cart, &[lamp], &address(user.id), PaymentMethod::Cod).unwrap();
        (order, user)
    }

    #[test]
    fn status_emails_follow_the_status() {
        let (mut order, user) = order();
        order.transition_to(OrderStatus::Shipped).unwrap();
        let shipped = status_update(&order, &user, "https://shop.test");
        assert_eq!(shipped.to, "asha@example.com");
        assert!(shipped.subject.ends_with("has been Shipped"));
        assert!(shipped.html.contains("status shipped"));
        assert!(shipped.html.contains("Asha &lt;Admin&gt;"));

        order.transition_to(OrderStatus::Delivered).unwrap();
        let delivered = status_update(&order, &user, "https://shop.test");
        assert!(delivered.subject.contains("Delivered"));
        assert!(delivered.html.contains(&format!("https://shop.test/order/{}", order.id())));
    }

    #[test]
    fn placed_email_lists_lines() {
        let (order, user) = order();
        let email = order_placed(&order, &user, "http://localhost:8083");
        assert!(email.html.contains("<td>Lamp</td><td>2</td>"));
    }
}
