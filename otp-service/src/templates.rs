//! SMS message templates
// Copyright 2025 Francisco F. Pinochet
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.


/// Logical WhatsApp template names carried in `notification.whatsapp` jobs.
/// The notification worker owns the mapping to provider template ids.
pub const WA_TEMPLATE_OTP: &str = "otp";
pub const WA_TEMPLATE_TRIP_OTP: &str = "trip_otp";

/// SMS bodies rendered from typed parameters
#[derive(Debug, Clone)]
pub enum SmsTemplate<'a> {
    DriverOtp { otp: &'a str },
    CustomerTripOtp { start_otp: &'a str, end_otp: &'a str },
    TripCancelled { booking_id: &'a str, contact_number: &'a str },
    Custom { message: &'a str },
}

impl SmsTemplate<'_> {
    pub fn render(&self, website_name: &str) -> String {
        match self {
            SmsTemplate::DriverOtp { otp } => format!(
                "Thanks for choosing {website_name}. Your app verification OTP code is {otp}. \
                 If you did not request this code, kindly contact support."
            ),
            SmsTemplate::CustomerTripOtp { start_otp, end_otp } => format!(
                "Dear Customer, Start Ride OTP: {start_otp} End Ride OTP: {end_otp} \
                 Share these with your driver to start and end your {website_name} trip."
            ),
            SmsTemplate::TripCancelled {
                booking_id,
                contact_number,
            } => format!(
                "Dear Customer, Your trip at {website_name} has been cancelled. \
                 Booking ID: {booking_id}. For support call {contact_number}. \
                 You can also try to reschedule or request a refund."
            ),
            SmsTemplate::Custom { message } => message.to_string(),
        }
    }
}
