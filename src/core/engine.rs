use crate::core::steps::Provisioner;
use crate::domain::model::ProvisionReport;
use crate::domain::ports::ResourceManager;
use crate::utils::error::Result;
use crate::utils::monitor::StepMonitor;

/// Runs the provisioning steps in order. The first failure aborts the run;
/// whatever was created up to that point stays in place.
pub struct ProvisionEngine<R: ResourceManager> {
    provisioner: Provisioner<R>,
    monitor_enabled: bool,
}

impl<R: ResourceManager> ProvisionEngine<R> {
    pub fn new(provisioner: Provisioner<R>) -> Self {
        Self::new_with_monitoring(provisioner, false)
    }

    pub fn new_with_monitoring(provisioner: Provisioner<R>, monitor_enabled: bool) -> Self {
        Self {
            provisioner,
            monitor_enabled,
        }
    }

    pub async fn run(&self, ssh_public_key: &str) -> Result<ProvisionReport> {
        let mut monitor = StepMonitor::new(self.monitor_enabled);
        let deployment = self.provisioner.deployment();
        tracing::info!(
            "🚀 Provisioning '{}' in {} ({})",
            deployment.vm.name,
            deployment.resource_group,
            deployment.location
        );

        monitor.begin("resource group");
        let group = self.provisioner.create_resource_group().await?;

        monitor.begin("network");
        let (_vnet, subnet) = self.provisioner.setup_network().await?;

        monitor.begin("public ip");
        let mut public_ip = self.provisioner.create_public_ip().await?;

        monitor.begin("network interface");
        let nic = self.provisioner.create_nic(&subnet, &public_ip).await?;

        monitor.begin("virtual machine");
        let os_profile = self.provisioner.define_os_profile(ssh_public_key);
        let vm = self.provisioner.create_vm(&nic, os_profile).await?;
        monitor.finish();

        if public_ip.ip_address().is_none() {
            tracing::debug!("Public IP had no address at creation, reading it again");
            public_ip = self.provisioner.refresh_public_ip().await?;
        }
        if public_ip.ip_address().is_none() {
            tracing::warn!("⚠️ Public IP {} has no address assigned yet", public_ip.name);
        }

        monitor.log_final_stats();
        tracing::info!("✅ Virtual machine {} is ready", vm.id);

        Ok(ProvisionReport {
            vm_name: deployment.vm.name.clone(),
            admin_username: deployment.vm.admin_username.clone(),
            public_ip: public_ip.ip_address().map(str::to_string),
            resource_group_id: group.id,
            subnet_id: subnet.id,
            public_ip_id: public_ip.id,
            network_interface_id: nic.id,
            virtual_machine_id: vm.id,
            step_timings: monitor
                .timings()
                .iter()
                .map(|t| (t.step.clone(), t.elapsed))
                .collect(),
        })
    }

    /// Removes the resource group and everything in it.
    pub async fn teardown(&self) -> Result<()> {
        let mut monitor = StepMonitor::new(self.monitor_enabled);
        monitor.begin("delete resource group");
        self.provisioner.delete_resource_group().await?;
        monitor.finish();
        monitor.log_final_stats();
        Ok(())
    }
}
