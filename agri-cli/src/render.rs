use agri_core::{Alert, City, DashboardView, LoadStatus, ProfileState, ProviderResult};
use chrono::Local;

pub fn print_suggestions(query: &str, cities: &[City]) {
    if cities.is_empty() {
        println!("No cities match \"{query}\"");
        return;
    }
    for (i, city) in cities.iter().enumerate() {
        println!("{i:>2}  {city}");
    }
}

pub fn print_view(view: &DashboardView) {
    if let Some(message) = &view.banner {
        println!("!! {message}");
    }

    match &view.profile {
        ProfileState::Loaded(profile) if !profile.name.is_empty() => println!("Signed in as {}", profile.name),
        ProfileState::Loading => println!("Loading profile..."),
        _ => {}
    }

    let search = &view.search;
    match &search.committed_city {
        Some(city) => println!("City: {city}"),
        None => println!("City: (none selected)"),
    }
    if search.list_visible {
        println!("Suggestions for \"{}\":", search.raw_input);
        for (i, city) in search.suggestions.iter().enumerate() {
            println!("  /pick {i}  {city}");
        }
    } else if let Some(pending) = &search.pending_city {
        println!("Searching for {pending}...");
    }

    println!();
    println!("Weather");
    panel(&view.weather, |w| {
        println!("  {:.1}°C, {}", w.temp_c, w.condition);
    });

    println!("Forecast");
    panel(&view.forecast, |f| {
        for day in &f.days {
            println!(
                "  {}  {:>5.1}°C / {:>5.1}°C  {}",
                day.date.format("%a %d %b"),
                day.max_temp_c,
                day.min_temp_c,
                day.condition
            );
        }
    });
    print_alerts("Weather alerts", &view.forecast_alerts);

    println!("Mandi rates");
    panel(&view.rates, |rates| {
        if rates.is_empty() {
            println!("  No rates published");
        }
        for rate in rates {
            let market = if rate.mandi.is_empty() { String::new() } else { format!(" [{}]", rate.mandi) };
            println!(
                "  {:<20} min {:>8.0}  max {:>8.0}  retail {:>8.0}  {}{market}",
                rate.item, rate.min_price, rate.max_price, rate.retail_price, rate.unit
            );
        }
    });

    print_alerts("Live alerts", &view.live_alerts);
    if let Some(at) = view.live_alerts_refreshed_at {
        println!("  (updated {})", at.with_timezone(&Local).format("%H:%M:%S"));
    }
}

fn panel<T>(result: &ProviderResult<T>, show: impl FnOnce(&T)) {
    match (result.status, &result.value, &result.error) {
        (LoadStatus::Idle, _, _) => println!("  -"),
        (LoadStatus::Loading, _, _) => println!("  Loading..."),
        (LoadStatus::Ready, Some(value), _) => show(value),
        (LoadStatus::Failed, _, Some(err)) => println!("  Unavailable ({})", err.kind),
        _ => println!("  -"),
    }
}

fn print_alerts(title: &str, alerts: &[Alert]) {
    println!("{title}");
    if alerts.is_empty() {
        println!("  No alerts");
        return;
    }
    for alert in alerts {
        let until = alert
            .expires
            .map(|at| format!(" until {}", at.with_timezone(&Local).format("%d %b %H:%M")))
            .unwrap_or_default();
        if alert.headline.is_empty() {
            println!("  {}{until}", alert.event);
        } else {
            println!("  {}: {}{until}", alert.event, alert.headline);
        }
    }
}
